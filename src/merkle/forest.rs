//! Merkle Forest
//!
//! Ordered sequence of fixed-depth trees. Trees are created lazily the
//! first time an event addresses them; a batch that would cross a tree's
//! leaf capacity is redirected entirely into the next tree at position 0.

use std::collections::BTreeMap;

use alloy_primitives::U256;
use tracing::debug;

use super::tree::{MerkleError, MerkleProof, MerkleTree, TreeState, TOTAL_LEAVES};

/// The forest of commitment trees for one chain.
#[derive(Default)]
pub struct MerkleForest {
    trees: BTreeMap<u32, MerkleTree>,
}

impl MerkleForest {
    pub fn new() -> Self {
        MerkleForest {
            trees: BTreeMap::new(),
        }
    }

    /// Resolve the tree and start position a batch actually lands in.
    ///
    /// A batch that would cross the capacity boundary is not split: the
    /// entire batch is placed in the next tree starting at position 0.
    pub fn resolve_batch(tree_number: u32, start_position: usize, len: usize) -> (u32, usize) {
        if start_position + len > TOTAL_LEAVES {
            (tree_number + 1, 0)
        } else {
            (tree_number, start_position)
        }
    }

    /// Insert a batch of leaves, creating trees as needed and applying the
    /// boundary redirect policy. Parents stay dirty until `rebuild_dirty`.
    pub fn insert_leaves(
        &mut self,
        tree_number: u32,
        start_position: usize,
        leaves: &[U256],
    ) -> Result<(), MerkleError> {
        if leaves.is_empty() {
            return Ok(());
        }

        let (tree_number, start_position) =
            Self::resolve_batch(tree_number, start_position, leaves.len());
        if tree_number != 0 && start_position == 0 && !self.trees.contains_key(&tree_number) {
            debug!(tree = tree_number, "starting new commitment tree");
        }

        self.tree_entry(tree_number).insert_leaves(leaves, start_position)
    }

    /// Append a nullifier to a tree's set, creating the tree if the event
    /// stream addresses it first.
    pub fn insert_nullifier(&mut self, tree_number: u32, nullifier: U256) {
        self.tree_entry(tree_number).insert_nullifier(nullifier);
    }

    pub fn root(&self, tree_number: u32) -> Result<U256, MerkleError> {
        Ok(self.tree(tree_number)?.root())
    }

    /// Inclusion proof for a leaf value in a given tree.
    pub fn proof(&self, tree_number: u32, leaf: U256) -> Result<MerkleProof, MerkleError> {
        self.tree(tree_number)?.proof(leaf)
    }

    /// Rebuild every tree whose parents are stale.
    pub fn rebuild_dirty(&mut self) -> Result<(), MerkleError> {
        for tree in self.trees.values_mut() {
            if tree.is_dirty() {
                tree.rebuild()?;
            }
        }
        Ok(())
    }

    pub fn tree(&self, tree_number: u32) -> Result<&MerkleTree, MerkleError> {
        if self.trees.is_empty() {
            return Err(MerkleError::NoTreesInitialized);
        }
        self.trees
            .get(&tree_number)
            .ok_or(MerkleError::TreeIndexOutOfRange { tree: tree_number })
    }

    pub fn trees(&self) -> impl Iterator<Item = (&u32, &MerkleTree)> {
        self.trees.iter()
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Highest tree number present, if any.
    pub fn last_tree_number(&self) -> Option<u32> {
        self.trees.keys().next_back().copied()
    }

    pub fn states(&self) -> BTreeMap<u32, TreeState> {
        self.trees.iter().map(|(k, v)| (*k, v.state())).collect()
    }

    pub fn from_states(states: BTreeMap<u32, TreeState>) -> Self {
        let trees = states
            .into_iter()
            .map(|(number, state)| (number, MerkleTree::from_state(state)))
            .collect();
        MerkleForest { trees }
    }

    fn tree_entry(&mut self, tree_number: u32) -> &mut MerkleTree {
        self.trees
            .entry(tree_number)
            .or_insert_with(|| MerkleTree::new(tree_number))
    }
}
