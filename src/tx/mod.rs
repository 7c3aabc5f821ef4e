//! Transaction Building
//!
//! Assembles shield, transfer, and unshield calldata from selected
//! notes, invoking the external prover for the SNARK-backed paths.

pub mod builder;
pub mod prover;

pub use builder::{open_annotation, select_notes, BuilderError, Receiver, TreeSpend, TxBuilder};
pub use prover::{ProofRequest, Prover, ProverError, PublicInputs};
