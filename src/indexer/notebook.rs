//! Notebook
//!
//! Per-tree, index-addressed record of an account's decrypted notes.
//! Slot `i` is filled exactly when the owner could decrypt the
//! ciphertext behind leaf `i`. Slots are write-once; spent-ness is never
//! recorded here, it is derived from the tree's nullifier set at query
//! time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::abi::TokenData;
use crate::merkle::MerkleTree;
use crate::note::{Note, NoteError};

/// Notebook errors
#[derive(Debug, Error)]
pub enum NotebookError {
    /// A slot was written twice with different contents. The event
    /// stream never legitimately re-derives a different note for the
    /// same leaf.
    #[error("notebook slot {index} already holds a different note")]
    SlotConflict { index: usize },
}

/// Decrypted notes for one tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notebook {
    slots: Vec<Option<Note>>,
}

impl Notebook {
    pub fn new() -> Self {
        Notebook { slots: Vec::new() }
    }

    pub fn from_slots(slots: Vec<Option<Note>>) -> Self {
        Notebook { slots }
    }

    pub fn slots(&self) -> &[Option<Note>] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }

    pub fn note(&self, index: usize) -> Option<&Note> {
        self.slots.get(index).and_then(|slot| slot.as_ref())
    }

    /// Write-once insert at a leaf index. Re-deriving the identical note
    /// (log replay during resync) is a no-op.
    pub fn set_note(&mut self, index: usize, note: Note) -> Result<(), NotebookError> {
        if self.slots.len() <= index {
            self.slots.resize(index + 1, None);
        }

        match &self.slots[index] {
            Some(existing) if *existing == note => Ok(()),
            Some(_) => Err(NotebookError::SlotConflict { index }),
            None => {
                self.slots[index] = Some(note);
                Ok(())
            }
        }
    }

    /// Unspent notes of a token, in leaf order. Spent-ness is one set
    /// probe per note against the owning tree's nullifiers.
    pub fn unspent_notes(
        &self,
        token: &TokenData,
        tree: &MerkleTree,
    ) -> Result<Vec<Note>, NoteError> {
        let mut notes = Vec::new();
        for note in self.slots.iter().flatten() {
            if note.token() != token {
                continue;
            }
            if !tree.has_nullifier(&note.nullifier()?) {
                notes.push(note.clone());
            }
        }
        Ok(notes)
    }

    /// Sum of unspent values of a token.
    pub fn balance(&self, token: &TokenData, tree: &MerkleTree) -> Result<u128, NoteError> {
        Ok(self
            .unspent_notes(token, tree)?
            .iter()
            .map(|note| note.value())
            .sum())
    }
}
