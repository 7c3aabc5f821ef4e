//! In-Memory Storage
//!
//! Thread-safe blob store for tests and development. Contents are lost
//! when the process exits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::traits::{StateStore, StorageError};

/// In-memory blob store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            blobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored namespaces.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, namespace: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blobs.read().await.get(namespace).cloned())
    }

    async fn put(&self, namespace: &str, blob: &[u8]) -> Result<(), StorageError> {
        self.blobs
            .write()
            .await
            .insert(namespace.to_string(), blob.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get("indexer:1").await.unwrap().is_none());

        store.put("indexer:1", b"blob").await.unwrap();
        assert_eq!(store.get("indexer:1").await.unwrap().unwrap(), b"blob");

        store.put("indexer:1", b"newer").await.unwrap();
        assert_eq!(store.get("indexer:1").await.unwrap().unwrap(), b"newer");
        assert_eq!(store.len().await, 1);
    }
}
