//! Indexer Core
//!
//! Owns the forest and the registered accounts. Each log mutates the
//! forest once, then fans out to every account for decryption. Parent
//! rebuilds are deferred to the end of each batch, so roots must not be
//! read mid-batch.

use std::collections::BTreeMap;

use alloy_primitives::U256;
use tracing::warn;

use crate::abi::TokenData;
use crate::chain::Log;
use crate::config::ChainConfig;
use crate::crypto::poseidon::poseidon_hash;
use crate::crypto::AccountKeys;
use crate::merkle::{MerkleError, MerkleForest, MerkleProof};
use crate::note::{Note, NoteError};
use crate::storage::snapshot::{AccountSnapshot, ForestSnapshot, SnapshotError};
use thiserror::Error;

use super::events::{decode_log, PoolEvent};
use super::indexed_account::IndexedAccount;
use super::notebook::Notebook;

/// Indexer errors
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),

    #[error("note error: {0}")]
    Note(#[from] NoteError),
}

/// Per-call processing options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    /// Skip forest mutations; account fan-out still runs. Used when
    /// replaying history into a freshly restored account against an
    /// already-built forest.
    pub skip_merkle_tree: bool,
}

/// The chain-state indexer.
pub struct Indexer {
    chain: ChainConfig,
    forest: MerkleForest,
    accounts: Vec<IndexedAccount>,
    /// Highest block whose events have been applied. Monotone.
    end_block: u64,
}

impl Indexer {
    pub fn new(chain: ChainConfig) -> Self {
        let end_block = chain.global_start_block;
        Indexer {
            chain,
            forest: MerkleForest::new(),
            accounts: Vec::new(),
            end_block,
        }
    }

    /// Restore the forest and sync cursor from a snapshot. Accounts hold
    /// key material and are never part of the shared snapshot; re-register
    /// them (or restore their own snapshots) before syncing.
    pub fn from_snapshot(chain: ChainConfig, snapshot: ForestSnapshot) -> Self {
        let mut states = BTreeMap::new();
        for (number, state) in snapshot.trees.into_iter().enumerate() {
            if let Some(state) = state {
                states.insert(number as u32, state);
            }
        }

        Indexer {
            chain,
            forest: MerkleForest::from_states(states),
            accounts: Vec::new(),
            end_block: snapshot.end_block,
        }
    }

    pub fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    pub fn end_block(&self) -> u64 {
        self.end_block
    }

    pub fn forest(&self) -> &MerkleForest {
        &self.forest
    }

    /// Register an account for fan-out. Idempotent per key pair.
    pub fn register_account(&mut self, keys: &AccountKeys) {
        if self.accounts.iter().any(|a| a.keys() == keys) {
            return;
        }
        self.accounts.push(IndexedAccount::new(*keys));
    }

    pub fn account(&self, keys: &AccountKeys) -> Option<&IndexedAccount> {
        self.accounts.iter().find(|a| a.keys() == keys)
    }

    pub fn accounts(&self) -> &[IndexedAccount] {
        &self.accounts
    }

    /// Advance the sync cursor over a span known to be fully processed,
    /// even when it contained no logs. Never rewinds.
    pub fn advance_cursor(&mut self, block: u64) {
        if block <= self.end_block {
            return;
        }
        self.end_block = block;
        for account in self.accounts.iter_mut() {
            let advanced = account.end_block().max(block);
            account.set_end_block(advanced.min(self.end_block));
        }
    }

    /// Decode and apply exactly one log. Undecodable logs are skipped
    /// with a warning.
    pub fn process_log(&mut self, log: &Log, opts: &ProcessOptions) -> Result<(), IndexerError> {
        let event = match decode_log(log) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    block = log.block_number,
                    index = log.log_index,
                    "skipping log: {e}"
                );
                return Ok(());
            }
        };

        self.apply_event(&event, opts)
    }

    /// Apply a batch in order, rebuild the trees it touched, and advance
    /// the sync cursors.
    pub fn process_logs(&mut self, logs: &[Log], opts: &ProcessOptions) -> Result<(), IndexerError> {
        let mut max_block = None;
        for log in logs {
            self.process_log(log, opts)?;
            max_block = Some(max_block.map_or(log.block_number, |m: u64| m.max(log.block_number)));
        }

        self.forest.rebuild_dirty()?;

        if let Some(max_block) = max_block {
            self.end_block = self.end_block.max(max_block);
            for account in self.accounts.iter_mut() {
                let advanced = account.end_block().max(max_block);
                account.set_end_block(advanced.min(self.end_block));
            }
        }

        Ok(())
    }

    fn apply_event(&mut self, event: &PoolEvent, opts: &ProcessOptions) -> Result<(), IndexerError> {
        match event {
            PoolEvent::Shield(shield) => {
                if !opts.skip_merkle_tree {
                    let mut leaves = Vec::with_capacity(shield.commitments.len());
                    for preimage in &shield.commitments {
                        let leaf = poseidon_hash(&[
                            U256::from_be_bytes(preimage.npk.0),
                            preimage.token.token_id(),
                            U256::from(preimage.value.to::<u128>()),
                        ])
                        .map_err(MerkleError::from)?;
                        leaves.push(leaf);
                    }

                    self.forest.insert_leaves(
                        shield.treeNumber.saturating_to(),
                        shield.startPosition.saturating_to(),
                        &leaves,
                    )?;
                }

                for account in self.accounts.iter_mut() {
                    account.handle_shield(shield);
                }
            }
            PoolEvent::Transact(transact) => {
                if !opts.skip_merkle_tree {
                    let leaves: Vec<U256> = transact
                        .hash
                        .iter()
                        .map(|h| U256::from_be_bytes(h.0))
                        .collect();

                    self.forest.insert_leaves(
                        transact.treeNumber.saturating_to(),
                        transact.startPosition.saturating_to(),
                        &leaves,
                    )?;
                }

                for account in self.accounts.iter_mut() {
                    account.handle_transact(transact);
                }
            }
            PoolEvent::Nullified(nullified) => {
                if !opts.skip_merkle_tree {
                    for nullifier in &nullified.nullifier {
                        self.forest.insert_nullifier(
                            nullified.treeNumber as u32,
                            U256::from_be_bytes(nullifier.0),
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Unspent balance for a registered account. Unregistered keys read
    /// as empty.
    pub fn balance(&self, keys: &AccountKeys, token: &TokenData) -> Result<u128, IndexerError> {
        match self.account(keys) {
            Some(account) => Ok(account.balance(token, &self.forest)?),
            None => Ok(0),
        }
    }

    pub fn unspent_notes(
        &self,
        keys: &AccountKeys,
        token: &TokenData,
    ) -> Result<Vec<Note>, IndexerError> {
        match self.account(keys) {
            Some(account) => Ok(account.unspent_notes(token, &self.forest)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn unspent_notes_in_tree(
        &self,
        keys: &AccountKeys,
        token: &TokenData,
        tree_number: u32,
    ) -> Result<Vec<Note>, IndexerError> {
        match self.account(keys) {
            Some(account) => Ok(account.unspent_notes_in_tree(token, &self.forest, tree_number)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn root(&self, tree_number: u32) -> Result<U256, MerkleError> {
        self.forest.root(tree_number)
    }

    pub fn proof(&self, tree_number: u32, leaf: U256) -> Result<MerkleProof, MerkleError> {
        self.forest.proof(tree_number, leaf)
    }

    pub fn tree_numbers(&self) -> Vec<u32> {
        self.forest.trees().map(|(number, _)| *number).collect()
    }

    /// Serialized forest plus sync cursor.
    pub fn snapshot(&self) -> ForestSnapshot {
        let states = self.forest.states();
        let len = states
            .keys()
            .next_back()
            .map(|number| *number as usize + 1)
            .unwrap_or(0);

        let mut trees = vec![None; len];
        for (number, state) in states {
            trees[number as usize] = Some(state);
        }

        ForestSnapshot {
            end_block: self.end_block,
            trees,
        }
    }

    /// Serialized notebooks for a registered account.
    pub fn account_snapshot(&self, keys: &AccountKeys) -> Option<AccountSnapshot> {
        let account = self.account(keys)?;
        let len = account
            .notebooks()
            .keys()
            .next_back()
            .map(|number| *number as usize + 1)
            .unwrap_or(0);

        let mut trees = vec![None; len];
        for (number, notebook) in account.notebooks() {
            trees[*number as usize] = Some(notebook.slots().to_vec());
        }

        Some(AccountSnapshot {
            end_block: account.end_block(),
            trees,
        })
    }

    /// Restore an account's notebooks from a snapshot. Refuses a
    /// snapshot that is ahead of the indexer: the shared forest must be
    /// synced first.
    pub fn restore_account(
        &mut self,
        keys: &AccountKeys,
        snapshot: AccountSnapshot,
    ) -> Result<(), SnapshotError> {
        if snapshot.end_block > self.end_block {
            return Err(SnapshotError::AccountAheadOfIndexer {
                account: snapshot.end_block,
                indexer: self.end_block,
            });
        }

        let mut notebooks = BTreeMap::new();
        for (number, slots) in snapshot.trees.into_iter().enumerate() {
            if let Some(slots) = slots {
                notebooks.insert(number as u32, Notebook::from_slots(slots));
            }
        }

        let restored = IndexedAccount::from_parts(*keys, notebooks, snapshot.end_block);
        match self.accounts.iter_mut().find(|a| a.keys() == keys) {
            Some(existing) => *existing = restored,
            None => self.accounts.push(restored),
        }

        Ok(())
    }
}
