//! Transact Output Notes
//!
//! Outputs of a private transaction: send/change notes addressed to a
//! receiver's public keys, and unshield notes that pay out to a public
//! 0x address and never re-enter the forest as spendable state.

use alloy_primitives::{aliases::U120, Address, B256, U256};

use crate::abi::{CommitmentCiphertext, CommitmentPreimage, TokenData};
use crate::crypto::keys::{EcdhKey, MasterPublicKey, ViewingPublicKey};
use crate::crypto::poseidon::poseidon_hash;

use super::note::NoteError;

/// A note addressed to a receiver's master/viewing public keys. Change
/// notes are output notes addressed back to the sender.
#[derive(Debug, Clone)]
pub struct OutputNote {
    receiver_master: MasterPublicKey,
    receiver_viewing: ViewingPublicKey,
    value: u128,
    random: [u8; 16],
    token: TokenData,
    memo: String,
}

impl OutputNote {
    pub fn new(
        receiver_master: MasterPublicKey,
        receiver_viewing: ViewingPublicKey,
        value: u128,
        random: [u8; 16],
        token: TokenData,
        memo: String,
    ) -> Self {
        OutputNote {
            receiver_master,
            receiver_viewing,
            value,
            random,
            token,
            memo,
        }
    }

    pub fn value(&self) -> u128 {
        self.value
    }

    pub fn token(&self) -> &TokenData {
        &self.token
    }

    pub fn random(&self) -> [u8; 16] {
        self.random
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

    /// Encrypt for the receiver under an ephemeral key. The annotation
    /// data is already sealed for the sender and rides along opaquely.
    pub fn encrypt(
        &self,
        ephemeral: &EcdhKey,
        iv: [u8; 16],
        annotation_data: Vec<u8>,
    ) -> Result<CommitmentCiphertext, NoteError> {
        let shared = ephemeral.shared_key(&self.receiver_viewing);

        let mut random_value = [0u8; 32];
        random_value[..16].copy_from_slice(&self.random);
        random_value[16..].copy_from_slice(&self.value.to_be_bytes());

        let blocks = vec![
            self.receiver_master.to_u256().to_be_bytes::<32>().to_vec(),
            self.token.token_id().to_be_bytes::<32>().to_vec(),
            random_value.to_vec(),
            self.memo.as_bytes().to_vec(),
        ];

        let sealed = shared.encrypt_gcm(iv, &blocks)?;

        let mut header = [0u8; 32];
        header[..16].copy_from_slice(&sealed.iv);
        header[16..].copy_from_slice(&sealed.tag);

        Ok(CommitmentCiphertext {
            ciphertext: [
                B256::from(header),
                B256::from_slice(&sealed.data[0]),
                B256::from_slice(&sealed.data[1]),
                B256::from_slice(&sealed.data[2]),
            ],
            blindedSenderViewingKey: B256::from(*ephemeral.public_key().as_bytes()),
            blindedReceiverViewingKey: B256::from(*self.receiver_viewing.as_bytes()),
            annotationData: annotation_data.into(),
            memo: sealed.data[3].clone().into(),
        })
    }
}

/// A withdrawal output: pays `value` of `token` to a public address. The
/// recipient address takes the place of the note public key in the
/// commitment preimage.
#[derive(Debug, Clone)]
pub struct UnshieldNote {
    to: Address,
    value: u128,
    token: TokenData,
}

impl UnshieldNote {
    pub fn new(to: Address, value: u128, token: TokenData) -> Self {
        UnshieldNote { to, value, token }
    }

    pub fn to(&self) -> Address {
        self.to
    }

    pub fn value(&self) -> u128 {
        self.value
    }

    pub fn token(&self) -> &TokenData {
        &self.token
    }

    pub fn note_public_key(&self) -> U256 {
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(self.to.as_slice());
        U256::from_be_bytes(bytes)
    }

    pub fn commitment(&self) -> Result<U256, NoteError> {
        Ok(poseidon_hash(&[
            self.note_public_key(),
            self.token.token_id(),
            U256::from(self.value),
        ])?)
    }

    pub fn preimage(&self) -> CommitmentPreimage {
        CommitmentPreimage {
            npk: B256::from(self.note_public_key().to_be_bytes::<32>()),
            token: self.token.clone(),
            value: U120::saturating_from(self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::AccountKeys;
    use crate::note::note::Note;
    use alloy_primitives::address;

    #[test]
    fn test_output_note_round_trips_through_decrypt() {
        let receiver = AccountKeys::from_seed([9u8; 32]);
        let output = OutputNote::new(
            receiver.master_public_key().unwrap(),
            receiver.viewing_public_key(),
            5_000u128,
            [4u8; 16],
            TokenData::erc20(address!("1234567890123456789012345678901234567890")),
            "hello".to_string(),
        );

        let ephemeral = EcdhKey::from_bytes([7u8; 32]);
        let ciphertext = output.encrypt(&ephemeral, [3u8; 16], vec![]).unwrap();

        let note = Note::decrypt_transact(&receiver, 0, 12, &ciphertext).unwrap();
        assert_eq!(note.value(), 5_000);
        assert_eq!(note.memo(), "hello");
        assert_eq!(note.commitment().unwrap(), output.commitment().unwrap());
    }

    #[test]
    fn test_output_note_not_ours_is_miss() {
        let receiver = AccountKeys::from_seed([9u8; 32]);
        let output = OutputNote::new(
            receiver.master_public_key().unwrap(),
            receiver.viewing_public_key(),
            5_000u128,
            [4u8; 16],
            TokenData::erc20(address!("1234567890123456789012345678901234567890")),
            String::new(),
        );

        let ephemeral = EcdhKey::from_bytes([7u8; 32]);
        let ciphertext = output.encrypt(&ephemeral, [3u8; 16], vec![]).unwrap();

        let stranger = AccountKeys::from_seed([8u8; 32]);
        let err = Note::decrypt_transact(&stranger, 0, 12, &ciphertext).unwrap_err();
        assert!(err.is_miss());
    }

    #[test]
    fn test_unshield_commitment_binds_recipient() {
        let token = TokenData::erc20(address!("1234567890123456789012345678901234567890"));
        let a = UnshieldNote::new(
            address!("1111111111111111111111111111111111111111"),
            100,
            token.clone(),
        );
        let b = UnshieldNote::new(
            address!("2222222222222222222222222222222222222222"),
            100,
            token,
        );
        assert_ne!(a.commitment().unwrap(), b.commitment().unwrap());
    }
}
