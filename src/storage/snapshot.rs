//! Snapshot Codecs
//!
//! Serialized forms of the forest and of an account's notebooks, for
//! resuming from storage without re-fetching history. Tree and leaf
//! indices are preserved positionally; holes are allowed.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::merkle::TreeState;
use crate::note::Note;

/// Snapshot errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The account snapshot was produced by a newer sync than the
    /// indexer it is being loaded into. Sync the indexer first.
    #[error("account snapshot at block {account} is ahead of indexer at block {indexer}")]
    AccountAheadOfIndexer { account: u64, indexer: u64 },
}

/// Serialized forest plus sync cursor. Shared by every account on the
/// same chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestSnapshot {
    pub end_block: u64,
    /// Indexed by tree number; holes allowed.
    pub trees: Vec<Option<TreeState>>,
}

impl ForestSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Serialized notebooks for one account plus its sync cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub end_block: u64,
    /// Indexed by tree number, then by leaf index; holes allowed.
    pub trees: Vec<Option<Vec<Option<Note>>>>,
}

impl AccountSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Storage namespace of the shared indexer snapshot for a chain.
pub fn indexer_namespace(chain_id: u64) -> String {
    format!("indexer:{chain_id}")
}

/// Storage namespace of an account's notebook snapshot, keyed by its
/// master public key.
pub fn account_namespace(chain_id: u64, master_public_key: U256) -> String {
    format!("account:{chain_id}:{master_public_key:#066x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forest_snapshot_round_trip() {
        let snapshot = ForestSnapshot {
            end_block: 42,
            trees: vec![
                None,
                Some(TreeState {
                    number: 1,
                    levels: vec![vec![Some(U256::from(7u64)), None]],
                    nullifiers: vec![U256::from(9u64)],
                }),
            ],
        };

        let bytes = snapshot.to_bytes().unwrap();
        let restored = ForestSnapshot::from_bytes(&bytes).unwrap();
        assert_eq!(restored.end_block, 42);
        assert!(restored.trees[0].is_none());
        assert_eq!(restored.trees[1].as_ref().unwrap().nullifiers.len(), 1);
    }

    #[test]
    fn test_namespaces_are_distinct() {
        assert_ne!(indexer_namespace(1), indexer_namespace(11_155_111));
        assert_ne!(
            account_namespace(1, U256::from(1u64)),
            account_namespace(1, U256::from(2u64))
        );
    }

    #[test]
    fn test_corrupt_bytes_rejected() {
        assert!(ForestSnapshot::from_bytes(b"not json").is_err());
        assert!(AccountSnapshot::from_bytes(b"{}").is_err());
    }
}
