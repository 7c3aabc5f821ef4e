//! Shielded Pool and Relay Adapter Solidity Types
//!
//! Wire-level structs, events, and calldata builders for the on-chain
//! contracts. Event decoding and calldata encoding are bit-exact per the
//! ABI; nothing here signs or submits.

use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::{sol, SolValue};
use thiserror::Error;

use crate::crypto::hash_to_scalar;

sol! {
    #[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    enum TokenType {
        ERC20,
        ERC721,
        ERC1155
    }

    #[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct TokenData {
        TokenType tokenType;
        address tokenAddress;
        uint256 tokenSubID;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct CommitmentCiphertext {
        bytes32[4] ciphertext; // IV & tag | encrypted MPK | random & value | token
        bytes32 blindedSenderViewingKey;
        bytes32 blindedReceiverViewingKey;
        bytes annotationData; // Only the sender can decrypt
        bytes memo;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct ShieldCiphertext {
        bytes32[3] encryptedBundle; // IV & tag | encrypted random | receiver viewing public key
        bytes32 shieldKey; // Ephemeral public key the shared key derives from
    }

    #[derive(Debug, PartialEq, Eq)]
    struct CommitmentPreimage {
        bytes32 npk; // Poseidon(master public key, random)
        TokenData token;
        uint120 value;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct ShieldRequest {
        CommitmentPreimage preimage;
        ShieldCiphertext ciphertext;
    }

    #[derive(Debug, PartialEq, Eq)]
    enum UnshieldType {
        NONE,
        NORMAL,
        REDIRECT
    }

    #[derive(Debug, PartialEq, Eq)]
    struct BoundParams {
        uint16 treeNumber;
        uint72 minGasPrice;
        UnshieldType unshield;
        uint64 chainID;
        address adaptContract;
        bytes32 adaptParams;
        // Unshield outputs carry no ciphertext entry:
        // ciphertext length = commitments - unshields
        CommitmentCiphertext[] commitmentCiphertext;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct G1Point {
        uint256 x;
        uint256 y;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct G2Point {
        uint256[2] x;
        uint256[2] y;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SnarkProof {
        G1Point a;
        G2Point b;
        G1Point c;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Transaction {
        SnarkProof proof;
        bytes32 merkleRoot;
        bytes32[] nullifiers;
        bytes32[] commitments;
        BoundParams boundParams;
        CommitmentPreimage unshieldPreimage;
    }

    contract ShieldedPool {
        #[derive(Debug)]
        event Shield(
            uint256 treeNumber,
            uint256 startPosition,
            CommitmentPreimage[] commitments,
            ShieldCiphertext[] shieldCiphertext,
            uint256[] fees
        );

        #[derive(Debug)]
        event Transact(
            uint256 treeNumber,
            uint256 startPosition,
            bytes32[] hash,
            CommitmentCiphertext[] ciphertext
        );

        #[derive(Debug)]
        event Nullified(uint16 treeNumber, bytes32[] nullifier);

        function shield(ShieldRequest[] calldata _shieldRequests) external;
        function transact(Transaction[] calldata _transactions) external;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Call {
        address to;
        bytes data;
        uint256 value;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct ActionData {
        bytes31 random;
        bool requireSuccess;
        uint256 minGasLimit;
        Call[] calls;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct TokenTransfer {
        TokenData token;
        address to;
        uint256 value;
    }

    contract RelayAdapt {
        function multicall(bool _requireSuccess, Call[] calldata _calls) external payable;
        function wrapBase(uint256 _amount) external;
        function unwrapBase(uint256 _amount) external;
        function transfer(TokenTransfer[] calldata _transfers) external;
        function relay(Transaction[] calldata _transactions, ActionData calldata _actionData) external payable;
    }
}

/// Token data errors
#[derive(Debug, Error)]
pub enum TokenDataError {
    #[error("invalid token hash length: {0}")]
    InvalidHashLength(usize),

    #[error("non-fungible token hashes are not recoverable")]
    NonFungibleHash,
}

impl TokenData {
    /// Plain ERC20 token.
    pub fn erc20(address: Address) -> Self {
        TokenData {
            tokenType: TokenType::ERC20,
            tokenAddress: address,
            tokenSubID: U256::ZERO,
        }
    }

    /// Field-element token identifier used inside commitments.
    ///
    /// ERC20 tokens hash to their address; other token types hash the
    /// full (type, address, subID) triple into the scalar field.
    pub fn token_id(&self) -> U256 {
        if self.tokenType == TokenType::ERC20 {
            let mut bytes = [0u8; 32];
            bytes[12..].copy_from_slice(self.tokenAddress.as_slice());
            return U256::from_be_bytes(bytes);
        }

        // tokenType (32) | address (32) | subID (32)
        let mut data = Vec::with_capacity(96);
        data.extend_from_slice(&[0u8; 31]);
        data.push(self.tokenType as u8);
        data.extend_from_slice(&[0u8; 12]);
        data.extend_from_slice(self.tokenAddress.as_slice());
        data.extend_from_slice(&self.tokenSubID.to_be_bytes::<32>());

        hash_to_scalar(&data)
    }

    /// Recover token data from the 32-byte identifier carried in a note
    /// ciphertext. Only ERC20 identifiers are invertible.
    pub fn from_token_id_bytes(bytes: &[u8]) -> Result<Self, TokenDataError> {
        if bytes.len() != 32 {
            return Err(TokenDataError::InvalidHashLength(bytes.len()));
        }
        if bytes[..12].iter().any(|b| *b != 0) {
            return Err(TokenDataError::NonFungibleHash);
        }

        Ok(TokenData::erc20(Address::from_slice(&bytes[12..32])))
    }
}

impl BoundParams {
    /// Field-element hash binding the transaction parameters into the
    /// SNARK public inputs.
    pub fn hash(&self) -> U256 {
        hash_to_scalar(&self.abi_encode())
    }
}

/// Hash binding a relayed transaction batch to its adapter action data:
/// keccak256(abi.encode(nullifiers[][], transactionCount, actionData)).
pub fn adapt_params_hash(
    nullifiers: &[Vec<B256>],
    transaction_count: usize,
    action_data: &ActionData,
) -> B256 {
    let encoded = (
        nullifiers.to_vec(),
        U256::from(transaction_count),
        action_data.clone(),
    )
        .abi_encode();
    keccak256(&encoded)
}
