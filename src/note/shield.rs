//! Shield Notes
//!
//! The outward-facing note created at deposit time. Value and token are
//! public in the commitment preimage; only the note random is encrypted,
//! bound to the receiver's viewing public key via an ephemeral shield
//! key derived from the signer.

use alloy_primitives::{aliases::U120, B256, U256};

use crate::abi::{CommitmentPreimage, ShieldCiphertext, ShieldRequest, TokenData};
use crate::crypto::keys::{EcdhKey, MasterPublicKey, ViewingPublicKey};
use crate::crypto::poseidon::poseidon_hash;

use super::note::NoteError;

/// Message signed by the external signer to derive the shield private
/// key: keccak256 of the returned signature bytes.
pub const SHIELD_KEY_DERIVATION_MESSAGE: &str = "ZRAIL_SHIELD_PRIVATE_KEY";

/// A deposit note before it hits the chain.
#[derive(Debug, Clone)]
pub struct ShieldNote {
    receiver_master: MasterPublicKey,
    receiver_viewing: ViewingPublicKey,
    value: u128,
    random: [u8; 16],
    token: TokenData,
}

impl ShieldNote {
    pub fn new(
        receiver_master: MasterPublicKey,
        receiver_viewing: ViewingPublicKey,
        value: u128,
        random: [u8; 16],
        token: TokenData,
    ) -> Self {
        ShieldNote {
            receiver_master,
            receiver_viewing,
            value,
            random,
            token,
        }
    }

    pub fn value(&self) -> u128 {
        self.value
    }

    pub fn token(&self) -> &TokenData {
        &self.token
    }

    pub fn note_public_key(&self) -> Result<U256, NoteError> {
        Ok(poseidon_hash(&[
            self.receiver_master.to_u256(),
            U256::from_be_slice(&self.random),
        ])?)
    }

    pub fn commitment(&self) -> Result<U256, NoteError> {
        Ok(poseidon_hash(&[
            self.note_public_key()?,
            self.token.token_id(),
            U256::from(self.value),
        ])?)
    }

    pub fn preimage(&self) -> Result<CommitmentPreimage, NoteError> {
        Ok(CommitmentPreimage {
            npk: B256::from(self.note_public_key()?.to_be_bytes::<32>()),
            token: self.token.clone(),
            value: U120::saturating_from(self.value),
        })
    }

    /// Seal the note random for the receiver. The shield key's public
    /// half travels in the clear so the receiver can derive the shared
    /// key with its viewing key alone.
    pub fn encrypt(
        &self,
        shield_key: &EcdhKey,
        iv: [u8; 16],
    ) -> Result<ShieldCiphertext, NoteError> {
        let shared = shield_key.shared_key(&self.receiver_viewing);
        let sealed = shared.encrypt_gcm(iv, &[self.random.to_vec()])?;

        let mut header = [0u8; 32];
        header[..16].copy_from_slice(&sealed.iv);
        header[16..].copy_from_slice(&sealed.tag);

        let mut body = [0u8; 32];
        body[..16].copy_from_slice(&sealed.data[0]);

        Ok(ShieldCiphertext {
            encryptedBundle: [
                B256::from(header),
                B256::from(body),
                B256::from(*self.receiver_viewing.as_bytes()),
            ],
            shieldKey: B256::from(*shield_key.public_key().as_bytes()),
        })
    }

    /// Full wire request: public preimage plus the sealed random.
    pub fn to_request(
        &self,
        shield_key: &EcdhKey,
        iv: [u8; 16],
    ) -> Result<ShieldRequest, NoteError> {
        Ok(ShieldRequest {
            preimage: self.preimage()?,
            ciphertext: self.encrypt(shield_key, iv)?,
        })
    }
}
