//! Decrypted Notes
//!
//! A note is the owner-local preimage of a Merkle leaf. Notes are only
//! ever produced by decrypting event ciphertexts with the account's
//! viewing key; a failed decryption means the commitment belongs to
//! someone else and is not an error worth reporting.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::abi::{CommitmentCiphertext, ShieldRequest, TokenData, TokenDataError};
use crate::crypto::aes::{AesError, Ciphertext};
use crate::crypto::keys::AccountKeys;
use crate::crypto::poseidon::{poseidon_hash, CryptoError};

/// Note errors. `is_miss` separates "not our note" (expected, silent)
/// from genuine failures.
#[derive(Debug, Error)]
pub enum NoteError {
    #[error("AES error: {0}")]
    Aes(#[from] AesError),

    #[error("note is not addressed to this account")]
    NotAddressed,

    #[error("token data error: {0}")]
    Token(#[from] TokenDataError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("malformed ciphertext: {0}")]
    Malformed(String),
}

impl NoteError {
    /// True when the ciphertext simply was not meant for us.
    pub fn is_miss(&self) -> bool {
        matches!(self, NoteError::Aes(_) | NoteError::NotAddressed)
    }
}

/// Which event kind produced the note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteOrigin {
    Shield,
    Transact,
}

/// A spendable note decrypted from the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    keys: AccountKeys,
    tree_number: u32,
    leaf_index: u32,
    random: [u8; 16],
    value: u128,
    token: TokenData,
    memo: String,
    origin: NoteOrigin,
}

impl Note {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        keys: AccountKeys,
        tree_number: u32,
        leaf_index: u32,
        random: [u8; 16],
        value: u128,
        token: TokenData,
        memo: String,
        origin: NoteOrigin,
    ) -> Self {
        Note {
            keys,
            tree_number,
            leaf_index,
            random,
            value,
            token,
            memo,
            origin,
        }
    }

    pub fn tree_number(&self) -> u32 {
        self.tree_number
    }

    pub fn leaf_index(&self) -> u32 {
        self.leaf_index
    }

    pub fn value(&self) -> u128 {
        self.value
    }

    pub fn token(&self) -> &TokenData {
        &self.token
    }

    pub fn memo(&self) -> &str {
        &self.memo
    }

    pub fn origin(&self) -> NoteOrigin {
        self.origin
    }

    pub fn keys(&self) -> &AccountKeys {
        &self.keys
    }

    pub fn random(&self) -> [u8; 16] {
        self.random
    }

    /// Note public key: Poseidon(master public key, random).
    pub fn note_public_key(&self) -> Result<U256, NoteError> {
        let master = self.keys.master_public_key()?;
        Ok(poseidon_hash(&[
            master.to_u256(),
            U256::from_be_slice(&self.random),
        ])?)
    }

    /// The Merkle leaf this note hashes to:
    /// Poseidon(npk, tokenId, value).
    pub fn commitment(&self) -> Result<U256, NoteError> {
        Ok(poseidon_hash(&[
            self.note_public_key()?,
            self.token.token_id(),
            U256::from(self.value),
        ])?)
    }

    /// Nullifier for this note's leaf index:
    /// Poseidon(nullifying key, leaf index).
    pub fn nullifier(&self) -> Result<U256, NoteError> {
        Ok(poseidon_hash(&[
            self.keys.nullifying_key()?,
            U256::from(self.leaf_index),
        ])?)
    }

    /// Try to decrypt a transact-event ciphertext addressed to `keys`.
    ///
    /// Bundle layout under the shared key: master public key (32) |
    /// token id (32) | random & value (16+16) | memo.
    pub fn decrypt_transact(
        keys: &AccountKeys,
        tree_number: u32,
        leaf_index: u32,
        encrypted: &CommitmentCiphertext,
    ) -> Result<Note, NoteError> {
        let blinded_sender = crate::crypto::keys::ViewingPublicKey::from_bytes(
            encrypted.blindedSenderViewingKey.0,
        );
        let shared = keys.viewing_key().shared_key(&blinded_sender);

        let mut iv = [0u8; 16];
        let mut tag = [0u8; 16];
        iv.copy_from_slice(&encrypted.ciphertext[0][..16]);
        tag.copy_from_slice(&encrypted.ciphertext[0][16..]);

        let ciphertext = Ciphertext {
            iv,
            tag,
            data: vec![
                encrypted.ciphertext[1].to_vec(),
                encrypted.ciphertext[2].to_vec(),
                encrypted.ciphertext[3].to_vec(),
                encrypted.memo.to_vec(),
            ],
        };

        let bundle = shared.decrypt_gcm(&ciphertext)?;

        let master = keys.master_public_key()?;
        if U256::from_be_slice(&bundle[0]) != master.to_u256() {
            return Err(NoteError::NotAddressed);
        }

        let token = TokenData::from_token_id_bytes(&bundle[1])?;

        let mut random = [0u8; 16];
        random.copy_from_slice(&bundle[2][..16]);
        let mut value_bytes = [0u8; 16];
        value_bytes.copy_from_slice(&bundle[2][16..]);
        let value = u128::from_be_bytes(value_bytes);

        let memo = String::from_utf8_lossy(&bundle[3]).into_owned();

        Ok(Note::new(
            *keys,
            tree_number,
            leaf_index,
            random,
            value,
            token,
            memo,
            NoteOrigin::Transact,
        ))
    }

    /// Try to decrypt a shield-event request addressed to `keys`.
    ///
    /// Only the note random travels encrypted; value and token are public
    /// in the commitment preimage. The recovered random must reproduce
    /// the preimage npk, otherwise the shield belongs to someone else.
    pub fn decrypt_shield(
        keys: &AccountKeys,
        tree_number: u32,
        leaf_index: u32,
        request: &ShieldRequest,
    ) -> Result<Note, NoteError> {
        let shield_key = crate::crypto::keys::ViewingPublicKey::from_bytes(
            request.ciphertext.shieldKey.0,
        );
        let shared = keys.viewing_key().shared_key(&shield_key);

        let bundle = &request.ciphertext.encryptedBundle;
        let mut iv = [0u8; 16];
        let mut tag = [0u8; 16];
        iv.copy_from_slice(&bundle[0][..16]);
        tag.copy_from_slice(&bundle[0][16..]);

        let ciphertext = Ciphertext {
            iv,
            tag,
            data: vec![bundle[1][..16].to_vec()],
        };
        let decrypted = shared.decrypt_gcm(&ciphertext)?;

        let mut random = [0u8; 16];
        random.copy_from_slice(&decrypted[0]);

        let master = keys.master_public_key()?;
        let npk = poseidon_hash(&[master.to_u256(), U256::from_be_slice(&random)])?;
        if npk != U256::from_be_bytes(request.preimage.npk.0) {
            return Err(NoteError::NotAddressed);
        }

        Ok(Note::new(
            *keys,
            tree_number,
            leaf_index,
            random,
            request.preimage.value.to::<u128>(),
            request.preimage.token.clone(),
            String::new(),
            NoteOrigin::Shield,
        ))
    }
}
