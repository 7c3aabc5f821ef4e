//! External Prover Interface
//!
//! The engine prepares everything the circuit binds - roots, nullifiers,
//! commitments, bound parameters - and hands it to the prover, which
//! returns the verification-level payload the wire ABI consumes.

use alloy_primitives::U256;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::abi::{BoundParams, CommitmentPreimage, Transaction};
use crate::merkle::MerkleProof;
use crate::note::Note;

/// The payload a successful proof produces, consumed verbatim by
/// `transact`/`relay` calldata.
pub type PublicInputs = Transaction;

/// Prover errors
#[derive(Debug, Error)]
pub enum ProverError {
    #[error("proving failed: {0}")]
    ProvingFailed(String),

    #[error("invalid witness: {0}")]
    InvalidWitness(String),
}

/// Everything one per-tree proof binds.
#[derive(Debug, Clone)]
pub struct ProofRequest {
    pub tree_number: u32,
    pub merkle_root: U256,
    /// Client-computed nullifier hints for the input notes. The on-chain
    /// Nullified event remains the only authority over spent state.
    pub nullifiers: Vec<U256>,
    pub commitments: Vec<U256>,
    pub bound_params: BoundParams,
    /// Present exactly when the transaction unshields.
    pub unshield_preimage: Option<CommitmentPreimage>,
    /// Input note witnesses.
    pub notes_in: Vec<Note>,
    pub merkle_proofs: Vec<MerkleProof>,
}

/// Async zk-SNARK prover consumed from outside the engine.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Prover: Send + Sync {
    /// Prove one per-tree transaction.
    async fn transact(&self, request: &ProofRequest) -> Result<PublicInputs, ProverError>;
}
