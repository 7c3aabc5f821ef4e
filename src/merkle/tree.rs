//! Sparse Fixed-Depth Merkle Tree
//!
//! Each tree holds up to 2^16 commitment leaves. Levels are stored
//! sparsely over the used prefix; empty positions take the precomputed
//! zero value for their level. Leaf inserts leave parent levels dirty;
//! `rebuild` recomputes levels 1..=16 by pairing consecutive slots and
//! never materializes zero subtrees.

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{hash_to_scalar, poseidon_hash, CryptoError};

/// Tree depth. Leaves live at level 0, the root at level 16.
pub const TREE_DEPTH: usize = 16;

/// Leaf capacity of a single tree.
pub const TOTAL_LEAVES: usize = 1 << TREE_DEPTH;

/// Merkle errors
#[derive(Debug, Error)]
pub enum MerkleError {
    /// A slot was written twice with different values. Leaves are
    /// append-only; this is unrecoverable corruption of the event stream.
    #[error("leaf conflict in tree {tree} at index {index}")]
    LeafConflict { tree: u32, index: usize },

    #[error("leaf not found")]
    LeafNotFound,

    #[error("insert of {count} leaves at {start} exceeds tree capacity")]
    CapacityExceeded { start: usize, count: usize },

    #[error("tree {tree} does not exist")]
    TreeIndexOutOfRange { tree: u32 },

    #[error("no trees initialized")]
    NoTreesInitialized,

    #[error("tree {tree} has dirty parents; rebuild before reading")]
    StaleTree { tree: u32 },

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Zero value for each level: zero[0] = keccak256("Railgun") mod SCALAR,
/// zero[k] = Poseidon(zero[k-1], zero[k-1]).
pub fn zero_value(level: usize) -> U256 {
    static ZEROS: OnceLock<[U256; TREE_DEPTH + 1]> = OnceLock::new();
    ZEROS.get_or_init(|| {
        let mut zeros = [U256::ZERO; TREE_DEPTH + 1];
        zeros[0] = hash_to_scalar(b"Railgun");
        for level in 1..=TREE_DEPTH {
            zeros[level] = poseidon_hash(&[zeros[level - 1], zeros[level - 1]])
                .expect("two-input poseidon");
        }
        zeros
    })[level]
}

/// Inclusion proof for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf: U256,
    /// Sibling values, leaf level first.
    pub elements: Vec<U256>,
    /// Path bits packed little-endian: bit k is 1 when the path node at
    /// level k is a right child.
    pub indices: U256,
    pub root: U256,
}

/// Serialized tree state: level 0 is the leaves, higher levels are cached
/// parents (absent levels are recomputed on the next rebuild).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeState {
    pub number: u32,
    pub levels: Vec<Vec<Option<U256>>>,
    pub nullifiers: Vec<U256>,
}

/// A single sparse commitment tree.
pub struct MerkleTree {
    number: u32,
    /// levels[0] = leaves .. levels[16] = root. Sparse over the used
    /// prefix; missing slots read as the level's zero value.
    levels: Vec<BTreeMap<usize, U256>>,
    max_leaf_index: Option<usize>,
    nullifiers: Vec<U256>,
    nullifier_set: HashSet<U256>,
    dirty: bool,
}

impl MerkleTree {
    pub fn new(number: u32) -> Self {
        MerkleTree {
            number,
            levels: vec![BTreeMap::new(); TREE_DEPTH + 1],
            max_leaf_index: None,
            nullifiers: Vec::new(),
            nullifier_set: HashSet::new(),
            dirty: false,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Number of leaf slots in the used prefix.
    pub fn leaves_len(&self) -> usize {
        self.max_leaf_index.map(|i| i + 1).unwrap_or(0)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn leaf(&self, index: usize) -> Option<U256> {
        self.levels[0].get(&index).copied()
    }

    /// Write leaves into level 0 starting at `start`. Parent levels are
    /// not recomputed; the tree becomes dirty. Re-inserting an identical
    /// (index, leaf) pair is a no-op.
    pub fn insert_leaves(&mut self, leaves: &[U256], start: usize) -> Result<(), MerkleError> {
        if leaves.is_empty() {
            return Ok(());
        }
        if start + leaves.len() > TOTAL_LEAVES {
            return Err(MerkleError::CapacityExceeded {
                start,
                count: leaves.len(),
            });
        }

        for (offset, leaf) in leaves.iter().enumerate() {
            let index = start + offset;
            match self.levels[0].get(&index) {
                Some(existing) if existing == leaf => continue,
                Some(_) => {
                    return Err(MerkleError::LeafConflict {
                        tree: self.number,
                        index,
                    })
                }
                None => {
                    self.levels[0].insert(index, *leaf);
                    self.dirty = true;
                }
            }
        }

        let last = start + leaves.len() - 1;
        self.max_leaf_index = Some(self.max_leaf_index.map_or(last, |m| m.max(last)));
        Ok(())
    }

    /// Recompute levels 1..=16 over the used prefix, pairing consecutive
    /// slots and substituting zero values for absent ones.
    pub fn rebuild(&mut self) -> Result<(), MerkleError> {
        let Some(max_index) = self.max_leaf_index else {
            self.dirty = false;
            return Ok(());
        };

        let mut width = max_index + 1;
        for level in 1..=TREE_DEPTH {
            let parent_width = width.div_ceil(2);
            let mut parents = BTreeMap::new();

            for i in 0..parent_width {
                let left = self.node(level - 1, 2 * i);
                let right = self.node(level - 1, 2 * i + 1);
                parents.insert(i, poseidon_hash(&[left, right])?);
            }

            self.levels[level] = parents;
            width = parent_width;
        }

        self.dirty = false;
        Ok(())
    }

    /// Current root. For a tree with no inserts this is the depth-16 zero
    /// value. Only valid between batches: a dirty tree reports its last
    /// rebuilt root.
    pub fn root(&self) -> U256 {
        self.levels[TREE_DEPTH]
            .get(&0)
            .copied()
            .unwrap_or_else(|| zero_value(TREE_DEPTH))
    }

    /// Inclusion proof for a leaf value. The tree must be clean.
    pub fn proof(&self, leaf: U256) -> Result<MerkleProof, MerkleError> {
        if self.dirty {
            return Err(MerkleError::StaleTree { tree: self.number });
        }

        let (index, _) = self.levels[0]
            .iter()
            .find(|(_, v)| **v == leaf)
            .ok_or(MerkleError::LeafNotFound)?;

        let mut elements = Vec::with_capacity(TREE_DEPTH);
        let mut indices = U256::ZERO;
        let mut position = *index;

        for level in 0..TREE_DEPTH {
            elements.push(self.node(level, position ^ 1));
            if position & 1 == 1 {
                indices |= U256::from(1u8) << level;
            }
            position >>= 1;
        }

        Ok(MerkleProof {
            leaf,
            elements,
            indices,
            root: self.root(),
        })
    }

    /// Append a nullifier to the tree's set. The set is append-only;
    /// replayed events are ignored.
    pub fn insert_nullifier(&mut self, nullifier: U256) {
        if self.nullifier_set.insert(nullifier) {
            self.nullifiers.push(nullifier);
        }
    }

    pub fn has_nullifier(&self, nullifier: &U256) -> bool {
        self.nullifier_set.contains(nullifier)
    }

    pub fn nullifiers(&self) -> &[U256] {
        &self.nullifiers
    }

    fn node(&self, level: usize, index: usize) -> U256 {
        self.levels[level]
            .get(&index)
            .copied()
            .unwrap_or_else(|| zero_value(level))
    }

    pub fn state(&self) -> TreeState {
        let mut levels = Vec::with_capacity(TREE_DEPTH + 1);
        let mut width = self.leaves_len();

        for level in 0..=TREE_DEPTH {
            let mut slots = vec![None; width];
            for (index, value) in &self.levels[level] {
                if *index < width {
                    slots[*index] = Some(*value);
                }
            }
            levels.push(slots);
            width = width.div_ceil(2);
        }

        TreeState {
            number: self.number,
            levels,
            nullifiers: self.nullifiers.clone(),
        }
    }

    /// Restore from a serialized state. Missing parent levels leave the
    /// tree dirty so the next rebuild recomputes them.
    pub fn from_state(state: TreeState) -> Self {
        let mut tree = MerkleTree::new(state.number);

        for (level, slots) in state.levels.iter().enumerate().take(TREE_DEPTH + 1) {
            for (index, value) in slots.iter().enumerate() {
                if let Some(value) = value {
                    tree.levels[level].insert(index, *value);
                }
            }
        }

        if let Some((max_index, _)) = tree.levels[0].iter().next_back() {
            tree.max_leaf_index = Some(*max_index);
            tree.dirty = tree.levels[TREE_DEPTH].is_empty();
        }

        for nullifier in state.nullifiers {
            tree.insert_nullifier(nullifier);
        }

        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u64) -> U256 {
        U256::from(n + 1)
    }

    #[test]
    fn test_empty_root_is_zero_chain() {
        let tree = MerkleTree::new(0);
        let expected = poseidon_hash(&[zero_value(TREE_DEPTH - 1), zero_value(TREE_DEPTH - 1)])
            .unwrap();
        assert_eq!(tree.root(), expected);
        assert_eq!(tree.root(), zero_value(TREE_DEPTH));
    }

    #[test]
    fn test_rebuild_order_independent() {
        let mut a = MerkleTree::new(0);
        a.insert_leaves(&[leaf(0), leaf(1), leaf(2)], 0).unwrap();
        a.rebuild().unwrap();

        let mut b = MerkleTree::new(0);
        b.insert_leaves(&[leaf(2)], 2).unwrap();
        b.insert_leaves(&[leaf(0), leaf(1)], 0).unwrap();
        b.rebuild().unwrap();

        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn test_insert_idempotent() {
        let mut tree = MerkleTree::new(0);
        tree.insert_leaves(&[leaf(0), leaf(1)], 0).unwrap();
        tree.rebuild().unwrap();
        let root = tree.root();

        tree.insert_leaves(&[leaf(0), leaf(1)], 0).unwrap();
        tree.rebuild().unwrap();
        assert_eq!(tree.root(), root);
    }

    #[test]
    fn test_conflicting_leaf_write_fails() {
        let mut tree = MerkleTree::new(3);
        tree.insert_leaves(&[leaf(0)], 5).unwrap();

        let err = tree.insert_leaves(&[leaf(9)], 5).unwrap_err();
        assert!(matches!(
            err,
            MerkleError::LeafConflict { tree: 3, index: 5 }
        ));
    }

    #[test]
    fn test_root_changes_with_leaves() {
        let mut tree = MerkleTree::new(0);
        let empty = tree.root();

        tree.insert_leaves(&[leaf(0)], 0).unwrap();
        tree.rebuild().unwrap();
        assert_ne!(tree.root(), empty);
    }

    #[test]
    fn test_proof_verifies_against_root() {
        let mut tree = MerkleTree::new(0);
        tree.insert_leaves(&[leaf(0), leaf(1), leaf(2), leaf(3), leaf(4)], 0)
            .unwrap();
        tree.rebuild().unwrap();

        let proof = tree.proof(leaf(3)).unwrap();
        assert_eq!(proof.elements.len(), TREE_DEPTH);

        // Walk the proof back up to the root.
        let mut node = proof.leaf;
        for (level, sibling) in proof.elements.iter().enumerate() {
            let right = (proof.indices >> level) & U256::from(1u8) == U256::from(1u8);
            node = if right {
                poseidon_hash(&[*sibling, node]).unwrap()
            } else {
                poseidon_hash(&[node, *sibling]).unwrap()
            };
        }
        assert_eq!(node, proof.root);
        assert_eq!(proof.root, tree.root());
    }

    #[test]
    fn test_proof_missing_leaf() {
        let mut tree = MerkleTree::new(0);
        tree.insert_leaves(&[leaf(0)], 0).unwrap();
        tree.rebuild().unwrap();

        assert!(matches!(
            tree.proof(leaf(42)),
            Err(MerkleError::LeafNotFound)
        ));
    }

    #[test]
    fn test_proof_requires_rebuild() {
        let mut tree = MerkleTree::new(1);
        tree.insert_leaves(&[leaf(0)], 0).unwrap();

        assert!(matches!(
            tree.proof(leaf(0)),
            Err(MerkleError::StaleTree { tree: 1 })
        ));
    }

    #[test]
    fn test_capacity_guard() {
        let mut tree = MerkleTree::new(0);
        let err = tree
            .insert_leaves(&[leaf(0), leaf(1)], TOTAL_LEAVES - 1)
            .unwrap_err();
        assert!(matches!(err, MerkleError::CapacityExceeded { .. }));
    }

    #[test]
    fn test_nullifier_set_append_only() {
        let mut tree = MerkleTree::new(0);
        tree.insert_nullifier(U256::from(1u64));
        tree.insert_nullifier(U256::from(2u64));
        tree.insert_nullifier(U256::from(1u64));

        assert_eq!(tree.nullifiers().len(), 2);
        assert!(tree.has_nullifier(&U256::from(1u64)));
        assert!(!tree.has_nullifier(&U256::from(3u64)));
    }

    #[test]
    fn test_state_round_trip_same_root() {
        let mut tree = MerkleTree::new(2);
        tree.insert_leaves(&[leaf(0), leaf(1), leaf(2)], 0).unwrap();
        tree.insert_nullifier(U256::from(77u64));
        tree.rebuild().unwrap();
        let root = tree.root();

        let restored = MerkleTree::from_state(tree.state());
        assert!(!restored.is_dirty());
        assert_eq!(restored.root(), root);
        assert!(restored.has_nullifier(&U256::from(77u64)));
    }

    #[test]
    fn test_state_without_parents_is_dirty() {
        let mut tree = MerkleTree::new(0);
        tree.insert_leaves(&[leaf(0), leaf(1)], 0).unwrap();
        tree.rebuild().unwrap();
        let root = tree.root();

        let mut state = tree.state();
        for level in state.levels.iter_mut().skip(1) {
            level.clear();
        }

        let mut restored = MerkleTree::from_state(state);
        assert!(restored.is_dirty());
        restored.rebuild().unwrap();
        assert_eq!(restored.root(), root);
    }
}
