//! Indexer
//!
//! Event-driven maintenance of the shielded pool state: the Merkle
//! forest, the per-account notebooks, and the sync cursor. The sync
//! driver feeds decoded log batches in; accounts read balances and
//! unspent notes out.

pub mod events;
pub mod indexed_account;
pub mod indexer;
pub mod notebook;
pub mod sync;

pub use events::{decode_log, DecodeError, PoolEvent};
pub use indexed_account::IndexedAccount;
pub use indexer::{Indexer, IndexerError, ProcessOptions};
pub use notebook::{Notebook, NotebookError};
pub use sync::{SyncConfig, SyncDriver, SyncError, SyncHandle};
