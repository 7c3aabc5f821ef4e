//! Cryptographic Primitives Adapter
//!
//! Uniform access to the primitives the engine consumes:
//! - Poseidon over BN254 (commitments, nullifiers, Merkle pair hashing)
//! - keccak256 reduced into the SNARK scalar field
//! - AES-256-GCM (note and shield bundles) and AES-256-CTR (annotation data)
//! - x25519 shared-secret derivation for viewing/shield keys

pub mod aes;
pub mod keys;
pub mod poseidon;

pub use aes::{AesError, Ciphertext, SharedKey};
pub use keys::{
    AccountKeys, EcdhKey, KeyError, MasterPublicKey, SpendingKey, ViewingKey, ViewingPublicKey,
};
pub use poseidon::{hash_to_scalar, poseidon_hash, CryptoError, SNARK_SCALAR_FIELD};
