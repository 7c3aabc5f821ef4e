//! AES Encryption for Note Payloads
//!
//! Two modes are used on the wire:
//! - AES-256-GCM for note and shield bundles (authenticated; a failed tag
//!   check is how "not our note" is detected)
//! - AES-256-CTR for sender annotation data

use aes::Aes256;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::{AeadInPlace, Aes256Gcm, KeyInit};
use ctr::cipher::{KeyIvInit, StreamCipher};
use thiserror::Error;

type Aes256Ctr = ctr::Ctr64BE<Aes256>;

/// AES errors
#[derive(Debug, Error)]
pub enum AesError {
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("malformed ciphertext: {0}")]
    Malformed(String),
}

/// An authenticated ciphertext split into same-length chunks as the
/// plaintext blocks that produced it. The IV and tag ride in front so the
/// whole structure packs into `bytes32` words on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    pub iv: [u8; 16],
    pub tag: [u8; 16],
    pub data: Vec<Vec<u8>>,
}

/// A 32-byte symmetric key, usually the keccak256 of an x25519 shared
/// secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SharedKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt plaintext blocks under AES-256-GCM. Chunk boundaries are
    /// preserved so the receiver can recover the original block structure.
    pub fn encrypt_gcm(&self, iv: [u8; 16], blocks: &[Vec<u8>]) -> Result<Ciphertext, AesError> {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.0));
        let nonce = GenericArray::from_slice(&iv[..12]);

        let mut buffer: Vec<u8> = blocks.concat();
        let tag = cipher
            .encrypt_in_place_detached(nonce, &[], &mut buffer)
            .map_err(|_| AesError::Malformed("encryption failed".to_string()))?;

        let mut data = Vec::with_capacity(blocks.len());
        let mut offset = 0;
        for block in blocks {
            data.push(buffer[offset..offset + block.len()].to_vec());
            offset += block.len();
        }

        let mut tag_bytes = [0u8; 16];
        tag_bytes.copy_from_slice(&tag);

        Ok(Ciphertext {
            iv,
            tag: tag_bytes,
            data,
        })
    }

    /// Decrypt an authenticated ciphertext, returning the original
    /// plaintext blocks. A bad tag means the key does not match.
    pub fn decrypt_gcm(&self, ciphertext: &Ciphertext) -> Result<Vec<Vec<u8>>, AesError> {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.0));
        let nonce = GenericArray::from_slice(&ciphertext.iv[..12]);

        let mut buffer: Vec<u8> = ciphertext.data.concat();
        cipher
            .decrypt_in_place_detached(
                nonce,
                &[],
                &mut buffer,
                GenericArray::from_slice(&ciphertext.tag),
            )
            .map_err(|_| AesError::AuthenticationFailed)?;

        let mut blocks = Vec::with_capacity(ciphertext.data.len());
        let mut offset = 0;
        for chunk in &ciphertext.data {
            blocks.push(buffer[offset..offset + chunk.len()].to_vec());
            offset += chunk.len();
        }

        Ok(blocks)
    }

    /// AES-256-CTR keystream application. Encryption and decryption are the
    /// same operation.
    pub fn apply_ctr(&self, iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
        let mut cipher = Aes256Ctr::new(
            GenericArray::from_slice(&self.0),
            GenericArray::from_slice(iv),
        );
        let mut buffer = data.to_vec();
        cipher.apply_keystream(&mut buffer);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SharedKey {
        SharedKey::from_bytes([7u8; 32])
    }

    #[test]
    fn test_gcm_round_trip() {
        let key = test_key();
        let blocks = vec![vec![1u8; 32], vec![2u8; 32], vec![3u8; 20]];

        let ct = key.encrypt_gcm([9u8; 16], &blocks).unwrap();
        assert_eq!(ct.data.len(), 3);
        assert_eq!(ct.data[2].len(), 20);

        let decrypted = key.decrypt_gcm(&ct).unwrap();
        assert_eq!(decrypted, blocks);
    }

    #[test]
    fn test_gcm_wrong_key_fails() {
        let ct = test_key().encrypt_gcm([9u8; 16], &[vec![1u8; 32]]).unwrap();

        let other = SharedKey::from_bytes([8u8; 32]);
        assert!(matches!(
            other.decrypt_gcm(&ct),
            Err(AesError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_gcm_tampered_tag_fails() {
        let key = test_key();
        let mut ct = key.encrypt_gcm([9u8; 16], &[vec![1u8; 32]]).unwrap();
        ct.tag[0] ^= 0xff;
        assert!(key.decrypt_gcm(&ct).is_err());
    }

    #[test]
    fn test_ctr_round_trip() {
        let key = test_key();
        let iv = [3u8; 16];
        let plaintext = b"sender annotation payload";

        let encrypted = key.apply_ctr(&iv, plaintext);
        assert_ne!(&encrypted[..], &plaintext[..]);

        let decrypted = key.apply_ctr(&iv, &encrypted);
        assert_eq!(&decrypted[..], &plaintext[..]);
    }
}
