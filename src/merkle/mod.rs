//! Append-Only Merkle Forest
//!
//! The shielded pool's commitment log: an ordered sequence of fixed-depth
//! sparse Merkle trees. Leaves are inserted as events arrive; parent levels
//! are rebuilt once per event batch.

pub mod forest;
pub mod tree;

pub use forest::MerkleForest;
pub use tree::{MerkleError, MerkleProof, MerkleTree, TreeState, TOTAL_LEAVES, TREE_DEPTH};
