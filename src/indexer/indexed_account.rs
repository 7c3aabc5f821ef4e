//! Indexed Account
//!
//! The indexer-side record of a registered account: its keys plus one
//! notebook per tree. Every Shield/Transact event fans out here; most
//! ciphertexts fail to decrypt because they belong to other people, and
//! that path stays silent.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::abi::{ShieldRequest, ShieldedPool, TokenData};
use crate::crypto::AccountKeys;
use crate::merkle::MerkleForest;
use crate::note::{Note, NoteError};

use super::notebook::Notebook;

/// A registered account inside the indexer.
#[derive(Debug, Clone)]
pub struct IndexedAccount {
    keys: AccountKeys,
    notebooks: BTreeMap<u32, Notebook>,
    end_block: u64,
}

impl IndexedAccount {
    pub fn new(keys: AccountKeys) -> Self {
        IndexedAccount {
            keys,
            notebooks: BTreeMap::new(),
            end_block: 0,
        }
    }

    pub fn from_parts(keys: AccountKeys, notebooks: BTreeMap<u32, Notebook>, end_block: u64) -> Self {
        IndexedAccount {
            keys,
            notebooks,
            end_block,
        }
    }

    pub fn keys(&self) -> &AccountKeys {
        &self.keys
    }

    pub fn end_block(&self) -> u64 {
        self.end_block
    }

    pub fn set_end_block(&mut self, end_block: u64) {
        self.end_block = end_block;
    }

    pub fn notebooks(&self) -> &BTreeMap<u32, Notebook> {
        &self.notebooks
    }

    pub fn notebook(&self, tree_number: u32) -> Option<&Notebook> {
        self.notebooks.get(&tree_number)
    }

    /// Try to decrypt every shield ciphertext in the event against this
    /// account's keys.
    pub fn handle_shield(&mut self, event: &ShieldedPool::Shield) {
        let tree_number: u32 = event.treeNumber.saturating_to();
        let start_position: usize = event.startPosition.saturating_to();
        let (tree_number, start_position) = MerkleForest::resolve_batch(
            tree_number,
            start_position,
            event.shieldCiphertext.len(),
        );

        for (offset, ciphertext) in event.shieldCiphertext.iter().enumerate() {
            let Some(preimage) = event.commitments.get(offset) else {
                warn!(tree = tree_number, "shield event has more ciphertexts than commitments");
                break;
            };

            let leaf_index = (start_position + offset) as u32;
            let request = ShieldRequest {
                preimage: preimage.clone(),
                ciphertext: ciphertext.clone(),
            };

            let note =
                Note::decrypt_shield(&self.keys, tree_number, leaf_index, &request);
            self.store_decrypted(tree_number, leaf_index, note);
        }
    }

    /// Try to decrypt every transact ciphertext in the event against
    /// this account's keys.
    pub fn handle_transact(&mut self, event: &ShieldedPool::Transact) {
        let tree_number: u32 = event.treeNumber.saturating_to();
        let start_position: usize = event.startPosition.saturating_to();
        let (tree_number, start_position) =
            MerkleForest::resolve_batch(tree_number, start_position, event.hash.len());

        for (offset, ciphertext) in event.ciphertext.iter().enumerate() {
            let leaf_index = (start_position + offset) as u32;
            let note =
                Note::decrypt_transact(&self.keys, tree_number, leaf_index, ciphertext);
            self.store_decrypted(tree_number, leaf_index, note);
        }
    }

    fn store_decrypted(
        &mut self,
        tree_number: u32,
        leaf_index: u32,
        note: Result<Note, NoteError>,
    ) {
        let note = match note {
            Ok(note) => note,
            Err(e) if e.is_miss() => return,
            Err(e) => {
                warn!(
                    tree = tree_number,
                    leaf = leaf_index,
                    "failed to decrypt note: {e}"
                );
                return;
            }
        };

        debug!(
            tree = tree_number,
            leaf = leaf_index,
            value = note.value(),
            "decrypted note"
        );

        if let Err(e) = self
            .notebooks
            .entry(tree_number)
            .or_default()
            .set_note(leaf_index as usize, note)
        {
            warn!(tree = tree_number, "notebook write rejected: {e}");
        }
    }

    /// Sum of unspent values of a token across all trees.
    pub fn balance(&self, token: &TokenData, forest: &MerkleForest) -> Result<u128, NoteError> {
        let mut total = 0u128;
        for (tree_number, notebook) in &self.notebooks {
            let Ok(tree) = forest.tree(*tree_number) else {
                continue;
            };
            total += notebook.balance(token, tree)?;
        }
        Ok(total)
    }

    /// Unspent notes of a token in (tree, leaf) order.
    pub fn unspent_notes(
        &self,
        token: &TokenData,
        forest: &MerkleForest,
    ) -> Result<Vec<Note>, NoteError> {
        let mut notes = Vec::new();
        for (tree_number, notebook) in &self.notebooks {
            let Ok(tree) = forest.tree(*tree_number) else {
                continue;
            };
            notes.extend(notebook.unspent_notes(token, tree)?);
        }
        Ok(notes)
    }

    /// Unspent notes of a token in one tree.
    pub fn unspent_notes_in_tree(
        &self,
        token: &TokenData,
        forest: &MerkleForest,
        tree_number: u32,
    ) -> Result<Vec<Note>, NoteError> {
        let Some(notebook) = self.notebooks.get(&tree_number) else {
            return Ok(Vec::new());
        };
        let Ok(tree) = forest.tree(tree_number) else {
            return Ok(Vec::new());
        };
        notebook.unspent_notes(token, tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EcdhKey;
    use crate::merkle::TOTAL_LEAVES;
    use crate::note::ShieldNote;
    use alloy_primitives::{address, U256};

    fn weth() -> TokenData {
        TokenData::erc20(address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"))
    }

    fn shield_event_for(
        keys: &AccountKeys,
        tree_number: u64,
        start_position: u64,
        value: u128,
    ) -> ShieldedPool::Shield {
        let note = ShieldNote::new(
            keys.master_public_key().unwrap(),
            keys.viewing_public_key(),
            value,
            [7u8; 16],
            weth(),
        );
        let request = note
            .to_request(&EcdhKey::from_bytes([9u8; 32]), [4u8; 16])
            .unwrap();

        ShieldedPool::Shield {
            treeNumber: U256::from(tree_number),
            startPosition: U256::from(start_position),
            commitments: vec![request.preimage],
            shieldCiphertext: vec![request.ciphertext],
            fees: vec![U256::ZERO],
        }
    }

    #[test]
    fn test_shield_fanout_fills_notebook_slot() {
        let keys = AccountKeys::from_seed([1u8; 32]);
        let mut account = IndexedAccount::new(keys);

        account.handle_shield(&shield_event_for(&keys, 0, 4, 1_000));

        let notebook = account.notebook(0).unwrap();
        assert_eq!(notebook.note(4).unwrap().value(), 1_000);
        assert!(notebook.note(3).is_none());
    }

    #[test]
    fn test_shield_for_stranger_leaves_notebook_empty() {
        let keys = AccountKeys::from_seed([1u8; 32]);
        let stranger = AccountKeys::from_seed([2u8; 32]);
        let mut account = IndexedAccount::new(keys);

        account.handle_shield(&shield_event_for(&stranger, 0, 0, 1_000));
        assert!(account.notebook(0).is_none());
    }

    #[test]
    fn test_crossing_batch_lands_in_next_tree() {
        let keys = AccountKeys::from_seed([1u8; 32]);
        let mut account = IndexedAccount::new(keys);

        // Start position one short of capacity with one ciphertext plus a
        // stranger's: the whole batch belongs to tree 1.
        let mut event = shield_event_for(&keys, 0, (TOTAL_LEAVES - 1) as u64, 500);
        let stranger = shield_event_for(&AccountKeys::from_seed([3u8; 32]), 0, 0, 1);
        event.commitments.push(stranger.commitments[0].clone());
        event.shieldCiphertext.push(stranger.shieldCiphertext[0].clone());

        account.handle_shield(&event);

        assert!(account.notebook(0).is_none());
        let notebook = account.notebook(1).unwrap();
        assert_eq!(notebook.note(0).unwrap().value(), 500);
    }

    #[test]
    fn test_transact_event_with_foreign_ciphertext_is_silent() {
        let keys = AccountKeys::from_seed([1u8; 32]);
        let mut account = IndexedAccount::new(keys);

        let event = ShieldedPool::Transact {
            treeNumber: U256::ZERO,
            startPosition: U256::ZERO,
            hash: vec![],
            ciphertext: vec![],
        };
        account.handle_transact(&event);
        assert!(account.notebooks().is_empty());
    }
}
