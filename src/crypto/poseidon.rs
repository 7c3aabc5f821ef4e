//! Poseidon Hashing over BN254
//!
//! Thin adapter over the circom-compatible `light-poseidon` implementation.
//! All field elements move through the crate as big-endian `U256` values
//! reduced modulo the SNARK scalar field.

use alloy_primitives::{keccak256, U256};
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use light_poseidon::{Poseidon, PoseidonHasher};
use thiserror::Error;

/// BN254 group order. Every commitment, nullifier, and Merkle node is a
/// field element strictly below this value.
pub const SNARK_SCALAR_FIELD: U256 = U256::from_limbs([
    0x43e1f593f0000001,
    0x2833e84879b97091,
    0xb85045b68181585d,
    0x30644e72e131a029,
]);

/// Crypto adapter errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("poseidon error: {0}")]
    Poseidon(String),

    #[error("invalid field element: {0}")]
    InvalidFieldElement(String),
}

/// Poseidon hash of 1..=12 field elements.
pub fn poseidon_hash(inputs: &[U256]) -> Result<U256, CryptoError> {
    let elements: Vec<Fr> = inputs
        .iter()
        .map(|v| Fr::from_be_bytes_mod_order(&v.to_be_bytes::<32>()))
        .collect();

    let mut hasher = Poseidon::<Fr>::new_circom(elements.len())
        .map_err(|e| CryptoError::Poseidon(e.to_string()))?;
    let digest = hasher
        .hash(&elements)
        .map_err(|e| CryptoError::Poseidon(e.to_string()))?;

    Ok(U256::from_be_slice(&digest.into_bigint().to_bytes_be()))
}

/// keccak256 of arbitrary bytes, reduced into the scalar field.
pub fn hash_to_scalar(data: &[u8]) -> U256 {
    let digest = keccak256(data);
    U256::from_be_bytes(digest.0) % SNARK_SCALAR_FIELD
}
