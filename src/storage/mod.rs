//! State Storage
//!
//! Opaque blob storage behind a pluggable async trait plus the snapshot
//! codecs the engine owns. Exactly two namespaces matter per account:
//! the indexer snapshot (shared per chain) and the account's notebook
//! snapshot.

pub mod memory;
pub mod snapshot;
pub mod traits;

pub use memory::MemoryStore;
pub use snapshot::{
    account_namespace, indexer_namespace, AccountSnapshot, ForestSnapshot, SnapshotError,
};
pub use traits::{StateStore, StorageError};
