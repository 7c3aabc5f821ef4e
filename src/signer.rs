//! External Signer Interface
//!
//! The engine never holds chain signing keys. It asks the signer for a
//! message signature (shield key derivation) or hands over finished
//! calldata for submission.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

/// Signer errors
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),
}

/// Calldata ready for signing and submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Address,
    pub data: Vec<u8>,
    pub value: U256,
    pub gas: Option<u64>,
}

impl TxRequest {
    pub fn new(to: Address, data: Vec<u8>) -> Self {
        TxRequest {
            to,
            data,
            value: U256::ZERO,
            gas: None,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(gas);
        self
    }
}

/// Chain-account signer consumed from outside the engine.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign an arbitrary message; returns the 0x-prefixed hex signature.
    async fn sign_message(&self, message: &[u8]) -> Result<String, SignerError>;

    /// Submit a transaction; returns the 0x-prefixed transaction hash.
    async fn send_transaction(&self, request: &TxRequest) -> Result<String, SignerError>;
}
