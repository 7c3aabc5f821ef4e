//! Common Error Types
//!
//! Root error aggregating every module's error enum, for callers that
//! drive the whole engine behind one surface.

use thiserror::Error;

use crate::account::{AccountError, AddressError};
use crate::chain::SourceError;
use crate::config::ConfigError;
use crate::crypto::{AesError, CryptoError, KeyError};
use crate::indexer::{DecodeError, IndexerError, SyncError};
use crate::logging::LoggingError;
use crate::merkle::MerkleError;
use crate::note::NoteError;
use crate::signer::SignerError;
use crate::storage::{SnapshotError, StorageError};
use crate::tx::{BuilderError, ProverError};

/// Root error type for the engine
#[derive(Debug, Error)]
pub enum ZrailError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("AES error: {0}")]
    Aes(#[from] AesError),

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),

    #[error("note error: {0}")]
    Note(#[from] NoteError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("indexer error: {0}")]
    Indexer(#[from] IndexerError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("address error: {0}")]
    Address(#[from] AddressError),

    #[error("account error: {0}")]
    Account(#[from] AccountError),

    #[error("builder error: {0}")]
    Builder(#[from] BuilderError),

    #[error("prover error: {0}")]
    Prover(#[from] ProverError),

    #[error("signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl ZrailError {
    /// True for transient failures a caller can retry: transport issues
    /// and storage backends, not malformed inputs or invariant breaks.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ZrailError::Source(_)
                | ZrailError::Storage(_)
                | ZrailError::Sync(SyncError::Source(_))
                | ZrailError::Sync(SyncError::Storage(_))
        )
    }
}

/// Result type alias using ZrailError
pub type Result<T> = std::result::Result<T, ZrailError>;
