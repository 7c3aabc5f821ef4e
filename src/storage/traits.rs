//! Storage Trait Definition
//!
//! One serialized blob per namespace. Implementations can wrap a browser
//! key-value store, a database, or plain memory; the engine owns the
//! parse/serialize side.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("corrupt blob in namespace {0}")]
    Corrupt(String),
}

/// Async blob store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the blob for a namespace, if any.
    async fn get(&self, namespace: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the blob for a namespace.
    async fn put(&self, namespace: &str, blob: &[u8]) -> Result<(), StorageError>;
}
