//! zrail - Shielded Pool Account Engine
//!
//! Client-side engine for a privacy-preserving asset account on an
//! Ethereum-compatible chain. It consumes the shielded pool's event
//! stream, maintains the append-only Merkle forest behind the pool,
//! decrypts the notes an account owns, and builds shield / transfer /
//! unshield calldata against that state.
//!
//! ## Engine
//!
//! 1. **Indexer** - owns the forest, fans events out to accounts
//! 2. **Sync driver** - adaptive log fetching with checkpoints
//! 3. **Account** - balances, unspent notes, transaction builders
//! 4. **Storage** - snapshot resume without re-fetching history
//!
//! ## External Collaborators
//!
//! The chain transport ([`chain::LogSource`]), the signer
//! ([`signer::Signer`]), and the zk prover ([`tx::Prover`]) are
//! consumed as traits; the engine ships none of them.

pub mod abi;
pub mod account;
pub mod chain;
pub mod common;
pub mod config;
pub mod crypto;
pub mod indexer;
pub mod logging;
pub mod merkle;
pub mod note;
pub mod signer;
pub mod storage;
pub mod tx;

// Re-exports: configuration
pub use config::{ChainConfig, ConfigError};

// Re-exports: keys and addresses
pub use account::{Account, AccountError, ZkAddress};
pub use crypto::{AccountKeys, MasterPublicKey, SpendingKey, ViewingKey, ViewingPublicKey};

// Re-exports: indexing and sync
pub use chain::{Log, LogSource, SourceError};
pub use indexer::{Indexer, IndexerError, ProcessOptions, SyncConfig, SyncDriver, SyncHandle};
pub use merkle::{MerkleForest, MerkleProof, MerkleTree, TOTAL_LEAVES, TREE_DEPTH};

// Re-exports: notes and transactions
pub use note::{Note, NoteOrigin};
pub use signer::{Signer, SignerError, TxRequest};
pub use tx::{Prover, ProverError, PublicInputs, TxBuilder};

// Re-exports: storage
pub use storage::{AccountSnapshot, ForestSnapshot, MemoryStore, StateStore};

// Re-exports: root error
pub use common::{Result, ZrailError};
