//! Account Key Material
//!
//! The three-role key system consumed from the external wallet derivation
//! suite: the spending key authorizes, the viewing key decrypts, and the
//! master public key identifies the address. This module only defines the
//! operations the engine needs; BIP39/BIP32 derivation lives outside.

use alloy_primitives::{keccak256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

use super::aes::SharedKey;
use super::poseidon::{poseidon_hash, CryptoError};

/// Key errors
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Private spending key scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingKey([u8; 32]);

impl SpendingKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SpendingKey(bytes)
    }

    pub fn from_hex(hex_key: &str) -> Result<Self, KeyError> {
        Ok(SpendingKey(decode_key_hex(hex_key)?))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Public spending key as a field element.
    pub fn public_key(&self) -> Result<U256, CryptoError> {
        poseidon_hash(&[U256::from_be_bytes(self.0)])
    }
}

/// Private viewing key. Doubles as the x25519 secret for note decryption
/// and as the preimage of the nullifying key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewingKey([u8; 32]);

impl ViewingKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        ViewingKey(bytes)
    }

    pub fn from_hex(hex_key: &str) -> Result<Self, KeyError> {
        Ok(ViewingKey(decode_key_hex(hex_key)?))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn public_key(&self) -> ViewingPublicKey {
        EcdhKey(self.0).public_key()
    }

    /// Nullifying key: Poseidon of the viewing key scalar.
    pub fn nullifying_key(&self) -> Result<U256, CryptoError> {
        poseidon_hash(&[U256::from_be_bytes(self.0)])
    }

    /// Shared AES key with another party's public key.
    pub fn shared_key(&self, their: &ViewingPublicKey) -> SharedKey {
        EcdhKey(self.0).shared_key(their)
    }
}

fn decode_key_hex(hex_key: &str) -> Result<[u8; 32], KeyError> {
    let bytes = hex::decode(hex_key.trim_start_matches("0x"))
        .map_err(|e| KeyError::InvalidHex(e.to_string()))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| KeyError::InvalidLength(len))
}

/// Public half of a viewing or shield key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewingPublicKey([u8; 32]);

impl ViewingPublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        ViewingPublicKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Any 32-byte x25519 secret: shield keys and per-output ephemerals use
/// the same operations as viewing keys.
#[derive(Debug, Clone, Copy)]
pub struct EcdhKey([u8; 32]);

impl EcdhKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        EcdhKey(bytes)
    }

    pub fn public_key(&self) -> ViewingPublicKey {
        let secret = StaticSecret::from(self.0);
        ViewingPublicKey(*PublicKey::from(&secret).as_bytes())
    }

    /// keccak256 of the raw Diffie-Hellman output.
    pub fn shared_key(&self, their: &ViewingPublicKey) -> SharedKey {
        let secret = StaticSecret::from(self.0);
        let shared = secret.diffie_hellman(&PublicKey::from(their.0));
        SharedKey::from_bytes(keccak256(shared.as_bytes()).0)
    }
}

/// Master public key: Poseidon(spending public key, nullifying key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterPublicKey(U256);

impl MasterPublicKey {
    pub fn new(spending_public_key: U256, nullifying_key: U256) -> Result<Self, CryptoError> {
        Ok(MasterPublicKey(poseidon_hash(&[
            spending_public_key,
            nullifying_key,
        ])?))
    }

    pub fn from_u256(value: U256) -> Self {
        MasterPublicKey(value)
    }

    pub fn to_u256(&self) -> U256 {
        self.0
    }
}

/// The key pair an account holds. The external wallet suite derives both
/// from BIP32 paths; this type only consumes the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountKeys {
    spending: SpendingKey,
    viewing: ViewingKey,
}

impl AccountKeys {
    pub fn new(spending: SpendingKey, viewing: ViewingKey) -> Self {
        AccountKeys { spending, viewing }
    }

    pub fn spending_key(&self) -> SpendingKey {
        self.spending
    }

    pub fn viewing_key(&self) -> ViewingKey {
        self.viewing
    }

    pub fn viewing_public_key(&self) -> ViewingPublicKey {
        self.viewing.public_key()
    }

    pub fn nullifying_key(&self) -> Result<U256, CryptoError> {
        self.viewing.nullifying_key()
    }

    pub fn master_public_key(&self) -> Result<MasterPublicKey, CryptoError> {
        MasterPublicKey::new(self.spending.public_key()?, self.viewing.nullifying_key()?)
    }
}

#[cfg(test)]
impl AccountKeys {
    /// Single-seed derivation for tests. Production accounts receive
    /// distinct BIP32-derived keys from the wallet suite.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let viewing = keccak256(seed).0;
        AccountKeys {
            spending: SpendingKey::from_bytes(seed),
            viewing: ViewingKey::from_bytes(viewing),
        }
    }
}
