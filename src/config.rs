//! Per-Chain Network Configuration
//!
//! Static deployment parameters for each supported chain plus optional
//! environment overrides. Contract addresses and deployment blocks MUST
//! match the live contracts; overrides exist for forks and local nodes.
//!
//! # Environment Variables
//!
//! - `ZRAIL_CHAIN_ID` - chain to load in `from_env` (default: 1)
//! - `ZRAIL_POOL_ADDRESS` - shielded pool contract override
//! - `ZRAIL_RELAY_ADAPT_ADDRESS` - relay adapter contract override
//! - `ZRAIL_WETH_ADDRESS` - wrapped native token override
//! - `ZRAIL_START_BLOCK` - deployment block override

use std::env;
use std::str::FromStr;

use alloy_primitives::{address, Address};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported chain id: {0}")]
    UnsupportedChain(u64),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Deployment parameters for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: &'static str,
    /// Shielded pool contract.
    pub railgun_address: Address,
    /// Relay adapter contract (native-asset wrapping, relayed calls).
    pub relay_adapt_address: Address,
    /// Wrapped native token; the zero address and the `0xeeee…` alias
    /// normalize to this.
    pub weth: Address,
    /// Block the pool contract was deployed at; syncing never starts
    /// earlier.
    pub global_start_block: u64,
    /// Shield fee taken by the pool, in basis points.
    pub fee_basis_points: u64,
}

impl ChainConfig {
    pub fn mainnet() -> Self {
        ChainConfig {
            chain_id: 1,
            name: "mainnet",
            railgun_address: address!("fa7093cdd9ee6932b4eb2c9e1cde7ce00b1fa4b9"),
            relay_adapt_address: address!("4025ee6512dbbda97049bcf5aa5d38c54af6be8a"),
            weth: address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
            global_start_block: 14_693_013,
            fee_basis_points: 25,
        }
    }

    pub fn sepolia() -> Self {
        ChainConfig {
            chain_id: 11_155_111,
            name: "sepolia",
            railgun_address: address!("eb6e53c61a95e06cbba4ebdf8a8f4e8b0e31b716"),
            relay_adapt_address: address!("66af917a66969fc5b008cbe48f2be1988e9a8cd1"),
            weth: address!("7b79995e5f793a07bc00c21412e50ecae098e7f9"),
            global_start_block: 3_850_000,
            fee_basis_points: 25,
        }
    }

    /// Config for a supported chain id.
    pub fn for_chain_id(chain_id: u64) -> Result<Self, ConfigError> {
        match chain_id {
            1 => Ok(Self::mainnet()),
            11_155_111 => Ok(Self::sepolia()),
            other => Err(ConfigError::UnsupportedChain(other)),
        }
    }

    /// Load from environment: chain selection plus address and start
    /// block overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let chain_id = match env::var("ZRAIL_CHAIN_ID") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("ZRAIL_CHAIN_ID".to_string(), raw.clone()))?,
            Err(_) => 1,
        };

        let mut config = Self::for_chain_id(chain_id)?;

        if let Some(addr) = env_address("ZRAIL_POOL_ADDRESS")? {
            config.railgun_address = addr;
        }
        if let Some(addr) = env_address("ZRAIL_RELAY_ADAPT_ADDRESS")? {
            config.relay_adapt_address = addr;
        }
        if let Some(addr) = env_address("ZRAIL_WETH_ADDRESS")? {
            config.weth = addr;
        }
        if let Ok(raw) = env::var("ZRAIL_START_BLOCK") {
            config.global_start_block = raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue("ZRAIL_START_BLOCK".to_string(), raw.clone()))?;
        }

        Ok(config)
    }

    /// Normalize a token address: the zero address and the conventional
    /// `0xeeee…` native-asset alias both mean the wrapped native token.
    pub fn normalize_token(&self, token: Address) -> Address {
        if token == Address::ZERO || token == NATIVE_TOKEN_ALIAS {
            self.weth
        } else {
            token
        }
    }

    /// Amount credited after the pool's shield fee.
    pub fn amount_after_fee(&self, value: u128) -> u128 {
        value - (value * self.fee_basis_points as u128) / 10_000
    }
}

/// The `0xeeee…eeee` placeholder some interfaces use for native ETH.
pub const NATIVE_TOKEN_ALIAS: Address = address!("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");

fn env_address(var: &str) -> Result<Option<Address>, ConfigError> {
    match env::var(var) {
        Ok(raw) => Address::from_str(&raw)
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(var.to_string(), raw.clone())),
        Err(_) => Ok(None),
    }
}
