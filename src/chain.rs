//! Chain Log Source Interface
//!
//! The one transport seam the engine consumes. Implementations wrap an
//! RPC provider, an archive service, or a fixture in tests; the engine
//! only cares about raw logs in `(block_number, log_index)` order.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

/// Log source errors. Range errors are recovered by the sync driver with
/// a smaller batch; anything else propagates.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("block range refused: {0}")]
    RangeExceeded(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl SourceError {
    pub fn is_range_error(&self) -> bool {
        matches!(self, SourceError::RangeExceeded(_))
    }
}

/// A raw chain log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub log_index: u64,
}

/// Async source of contract logs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Logs emitted by `address` in the inclusive block span.
    async fn get_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, SourceError>;

    /// Current chain head.
    async fn get_block_number(&self) -> Result<u64, SourceError>;
}
