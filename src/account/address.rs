//! 0zk Address Codec
//!
//! Bech32m encoding of (version, master public key, viewing public key,
//! chain tag). The chain tag is a u64 chain id, zero meaning
//! "any chain".

use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use bech32::{Bech32m, Hrp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{MasterPublicKey, ViewingPublicKey};

/// Human-readable prefix of shielded addresses.
pub const ADDRESS_HRP: &str = "0zk";

/// Current address format version.
pub const ADDRESS_VERSION: u8 = 1;

const PAYLOAD_LEN: usize = 1 + 32 + 32 + 8;

/// Address errors
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("bech32 error: {0}")]
    Bech32(String),

    #[error("wrong prefix: expected {ADDRESS_HRP}")]
    WrongPrefix,

    #[error("unsupported address version: {0}")]
    UnsupportedVersion(u8),

    #[error("wrong payload length: {0}")]
    WrongLength(usize),
}

/// A shielded pool address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZkAddress {
    pub master_public_key: MasterPublicKey,
    pub viewing_public_key: ViewingPublicKey,
    /// Zero means the address is valid on any chain.
    pub chain_id: u64,
}

impl ZkAddress {
    pub fn new(
        master_public_key: MasterPublicKey,
        viewing_public_key: ViewingPublicKey,
        chain_id: u64,
    ) -> Self {
        ZkAddress {
            master_public_key,
            viewing_public_key,
            chain_id,
        }
    }

    pub fn encode(&self) -> Result<String, AddressError> {
        let mut payload = Vec::with_capacity(PAYLOAD_LEN);
        payload.push(ADDRESS_VERSION);
        payload.extend_from_slice(&self.master_public_key.to_u256().to_be_bytes::<32>());
        payload.extend_from_slice(self.viewing_public_key.as_bytes());
        payload.extend_from_slice(&self.chain_id.to_be_bytes());

        let hrp = Hrp::parse(ADDRESS_HRP).map_err(|e| AddressError::Bech32(e.to_string()))?;
        bech32::encode::<Bech32m>(hrp, &payload).map_err(|e| AddressError::Bech32(e.to_string()))
    }

    pub fn decode(address: &str) -> Result<Self, AddressError> {
        let (hrp, payload) =
            bech32::decode(address).map_err(|e| AddressError::Bech32(e.to_string()))?;

        if hrp.as_str() != ADDRESS_HRP {
            return Err(AddressError::WrongPrefix);
        }
        if payload.len() != PAYLOAD_LEN {
            return Err(AddressError::WrongLength(payload.len()));
        }
        if payload[0] != ADDRESS_VERSION {
            return Err(AddressError::UnsupportedVersion(payload[0]));
        }

        let master = U256::from_be_slice(&payload[1..33]);
        let mut viewing = [0u8; 32];
        viewing.copy_from_slice(&payload[33..65]);
        let mut chain_tag = [0u8; 8];
        chain_tag.copy_from_slice(&payload[65..73]);

        Ok(ZkAddress {
            master_public_key: MasterPublicKey::from_u256(master),
            viewing_public_key: ViewingPublicKey::from_bytes(viewing),
            chain_id: u64::from_be_bytes(chain_tag),
        })
    }
}

impl fmt::Display for ZkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            Ok(encoded) => f.write_str(&encoded),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl FromStr for ZkAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AccountKeys;

    fn address() -> ZkAddress {
        let keys = AccountKeys::from_seed([1u8; 32]);
        ZkAddress::new(
            keys.master_public_key().unwrap(),
            keys.viewing_public_key(),
            1,
        )
    }

    #[test]
    fn test_round_trip() {
        let original = address();
        let encoded = original.encode().unwrap();
        assert!(encoded.starts_with("0zk1"));

        let decoded = ZkAddress::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_wrong_prefix_rejected() {
        let hrp = Hrp::parse("0yk").unwrap();
        let other = bech32::encode::<Bech32m>(hrp, &[0u8; PAYLOAD_LEN]).unwrap();
        assert!(matches!(
            ZkAddress::decode(&other),
            Err(AddressError::WrongPrefix)
        ));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut payload = vec![9u8];
        payload.extend_from_slice(&[0u8; PAYLOAD_LEN - 1]);
        let hrp = Hrp::parse(ADDRESS_HRP).unwrap();
        let encoded = bech32::encode::<Bech32m>(hrp, &payload).unwrap();
        assert!(matches!(
            ZkAddress::decode(&encoded),
            Err(AddressError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(ZkAddress::decode("0zk1garbage").is_err());
        assert!(ZkAddress::decode("not an address").is_err());
    }
}
