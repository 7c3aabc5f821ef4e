//! Sync Driver
//!
//! Pulls log ranges from the source with an adaptive batch size and
//! drives the indexer. Fetching and processing run concurrently through
//! a bounded channel: the producer suspends when the buffer is full, the
//! consumer drains whatever is ready in one batch. Progress is
//! checkpointed to storage on an interval and before any fatal error
//! propagates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy_primitives::Address;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::chain::{Log, LogSource, SourceError};
use crate::crypto::poseidon::CryptoError;
use crate::storage::snapshot::{account_namespace, indexer_namespace, SnapshotError};
use crate::storage::{StateStore, StorageError};

use super::indexer::{Indexer, IndexerError, ProcessOptions};

/// Sync errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("indexer error: {0}")]
    Indexer(#[from] IndexerError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Driver tuning.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound on the adaptive block batch.
    pub max_batch: u64,
    /// Checkpoint to storage every this many blocks of progress.
    pub save_interval: u64,
    /// Bounded buffer between fetcher and processor; doubles as the
    /// high watermark.
    pub channel_capacity: usize,
    /// Log fetch progress at info level.
    pub log_progress: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            max_batch: 1_000,
            save_interval: 25_000,
            channel_capacity: 8,
            log_progress: false,
        }
    }
}

/// Cooperative stop signal, checked between fetch batches.
#[derive(Clone)]
pub struct SyncHandle {
    stop: Arc<AtomicBool>,
}

impl SyncHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

struct Fetched {
    logs: Vec<Log>,
    through_block: u64,
}

/// Drives an indexer from a log source.
pub struct SyncDriver {
    indexer: Arc<RwLock<Indexer>>,
    source: Arc<dyn LogSource>,
    store: Option<Arc<dyn StateStore>>,
    config: SyncConfig,
    stop: Arc<AtomicBool>,
}

impl SyncDriver {
    pub fn new(indexer: Arc<RwLock<Indexer>>, source: Arc<dyn LogSource>) -> Self {
        SyncDriver {
            indexer,
            source,
            store: None,
            config: SyncConfig::default(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            stop: self.stop.clone(),
        }
    }

    /// Sync `[from, to]`. Defaults: from = the indexer's cursor, to =
    /// the source head. Events reach the indexer in strict
    /// `(block_number, log_index)` order.
    pub async fn sync(
        &self,
        from_block: Option<u64>,
        to_block: Option<u64>,
    ) -> Result<(), SyncError> {
        let (address, cursor) = {
            let indexer = self.indexer.read().await;
            (indexer.chain().railgun_address, indexer.end_block())
        };

        let from = from_block.unwrap_or(cursor);
        let to = match to_block {
            Some(to) => to,
            None => self.source.get_block_number().await?,
        };

        if from > to {
            debug!(from, to, "already synced");
            return Ok(());
        }

        info!(from, to, "syncing shielded pool events");

        let (tx, mut rx) = mpsc::channel(self.config.channel_capacity);
        let producer = tokio::spawn(fetch_ranges(
            self.source.clone(),
            address,
            from,
            to,
            self.config.clone(),
            self.stop.clone(),
            tx,
        ));

        let opts = ProcessOptions::default();
        let mut last_saved = from;
        let mut outcome = Ok(());

        'drain: loop {
            let mut batches = Vec::new();
            let received = rx
                .recv_many(&mut batches, self.config.channel_capacity)
                .await;
            if received == 0 {
                break;
            }

            let mut logs = Vec::new();
            let mut through = None;
            let mut fatal = None;
            for batch in batches {
                match batch {
                    Ok(fetched) => {
                        logs.extend(fetched.logs);
                        through = Some(fetched.through_block);
                    }
                    Err(e) => {
                        fatal = Some(e);
                        break;
                    }
                }
            }

            {
                let mut indexer = self.indexer.write().await;
                if let Err(e) = indexer.process_logs(&logs, &opts) {
                    outcome = Err(SyncError::Indexer(e));
                    break 'drain;
                }
                if let Some(through) = through {
                    indexer.advance_cursor(through);
                }
            }

            if let Some(e) = fatal {
                outcome = Err(SyncError::Source(e));
                break 'drain;
            }

            if let Some(through) = through {
                if through.saturating_sub(last_saved) >= self.config.save_interval {
                    self.checkpoint().await?;
                    last_saved = through;
                }
            }
        }

        // Preserve progress before surfacing any failure.
        self.checkpoint().await?;
        producer.await.ok();

        outcome
    }

    /// Persist the shared forest snapshot and one snapshot per account.
    async fn checkpoint(&self) -> Result<(), SyncError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let indexer = self.indexer.read().await;
        let chain_id = indexer.chain().chain_id;

        let blob = indexer.snapshot().to_bytes()?;
        store.put(&indexer_namespace(chain_id), &blob).await?;

        for account in indexer.accounts() {
            let keys = account.keys();
            if let Some(snapshot) = indexer.account_snapshot(keys) {
                let master = keys.master_public_key()?;
                store
                    .put(
                        &account_namespace(chain_id, master.to_u256()),
                        &snapshot.to_bytes()?,
                    )
                    .await?;
            }
        }

        debug!(chain = chain_id, "checkpointed snapshots");
        Ok(())
    }
}

/// Producer half: fetch ranges with adaptive batching and feed the
/// bounded channel. Sending suspends above the high watermark.
async fn fetch_ranges(
    source: Arc<dyn LogSource>,
    address: Address,
    mut from: u64,
    to: u64,
    config: SyncConfig,
    stop: Arc<AtomicBool>,
    tx: mpsc::Sender<Result<Fetched, SourceError>>,
) {
    let mut batch = config.max_batch.min(to - from + 1).max(1);

    while from <= to {
        if stop.load(Ordering::Relaxed) {
            debug!(block = from, "sync stopped by request");
            break;
        }

        let end = (from + batch - 1).min(to);
        match source.get_logs(address, from, end).await {
            Ok(mut logs) => {
                logs.sort_by_key(|log| (log.block_number, log.log_index));
                if config.log_progress {
                    info!(from, through = end, count = logs.len(), "fetched logs");
                }

                if tx
                    .send(Ok(Fetched {
                        logs,
                        through_block: end,
                    }))
                    .await
                    .is_err()
                {
                    break;
                }

                from = end + 1;
                batch = (batch * 6 / 5).max(batch + 1).min(config.max_batch);
            }
            Err(e) if e.is_range_error() => {
                if batch > 1 {
                    batch = (batch / 2).max(1);
                    debug!(batch, "range refused, halving batch");
                } else {
                    warn!(block = from, "range refused at minimum batch, skipping block");
                    from += 1;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
}
