//! Account Handle
//!
//! Ties a key pair to the indexer that owns the chain state and to the
//! prover/signer collaborators. All chain state reads go through the
//! indexer's lock; the account itself only owns its keys and builder
//! settings.

use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::abi::TokenData;
use crate::config::ChainConfig;
use crate::crypto::poseidon::CryptoError;
use crate::crypto::AccountKeys;
use crate::indexer::{Indexer, IndexerError};
use crate::merkle::{MerkleError, MerkleProof};
use crate::note::Note;
use crate::signer::{Signer, TxRequest};
use crate::tx::{select_notes, BuilderError, Prover, Receiver, TreeSpend, TxBuilder};

use super::address::{AddressError, ZkAddress};

/// Account errors
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("builder error: {0}")]
    Builder(#[from] BuilderError),

    #[error("indexer error: {0}")]
    Indexer(#[from] IndexerError),

    #[error("address error: {0}")]
    Address(#[from] AddressError),

    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("invalid token: {0}")]
    InvalidToken(String),
}

/// A shielded pool account.
pub struct Account {
    keys: AccountKeys,
    chain: ChainConfig,
    indexer: Arc<RwLock<Indexer>>,
    builder: TxBuilder,
    signer: Arc<dyn Signer>,
}

impl Account {
    pub fn new(
        keys: AccountKeys,
        chain: ChainConfig,
        indexer: Arc<RwLock<Indexer>>,
        prover: Arc<dyn Prover>,
        signer: Arc<dyn Signer>,
    ) -> Self {
        let builder = TxBuilder::new(chain.clone(), prover);
        Account {
            keys,
            chain,
            indexer,
            builder,
            signer,
        }
    }

    /// Replace the default builder (gas settings, deterministic seed).
    pub fn with_builder(mut self, builder: TxBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn keys(&self) -> &AccountKeys {
        &self.keys
    }

    /// Register with the indexer for decryption fan-out. Idempotent;
    /// call before the first sync.
    pub async fn register(&self) {
        self.indexer.write().await.register_account(&self.keys);
    }

    /// The account's 0zk address, tagged with this chain.
    pub fn address(&self) -> Result<ZkAddress, AccountError> {
        Ok(ZkAddress::new(
            self.keys.master_public_key()?,
            self.keys.viewing_public_key(),
            self.chain.chain_id,
        ))
    }

    /// Unspent balance of a token across all trees. Accepts a 0x token
    /// address or `eth`; the zero address and the native alias read as
    /// wrapped native.
    pub async fn balance(&self, token: &str) -> Result<u128, AccountError> {
        let token = self.parse_token(token)?;
        let indexer = self.indexer.read().await;
        Ok(indexer.balance(&self.keys, &token)?)
    }

    /// Unspent notes of a token in (tree, leaf) order.
    pub async fn unspent_notes(&self, token: &str) -> Result<Vec<Note>, AccountError> {
        let token = self.parse_token(token)?;
        let indexer = self.indexer.read().await;
        Ok(indexer.unspent_notes(&self.keys, &token)?)
    }

    /// Inclusion proof for a commitment, for external proof pipelines.
    pub async fn proof(&self, tree_number: u32, leaf: U256) -> Result<MerkleProof, AccountError> {
        let indexer = self.indexer.read().await;
        Ok(indexer.proof(tree_number, leaf)?)
    }

    /// Shield a single token amount to this account.
    pub async fn shield(&self, token: &str, value: u128) -> Result<TxRequest, AccountError> {
        self.shield_many(&[token], &[value]).await
    }

    /// Shield several token amounts in one call.
    pub async fn shield_many(
        &self,
        tokens: &[&str],
        values: &[u128],
    ) -> Result<TxRequest, AccountError> {
        if tokens.len() != values.len() {
            return Err(AccountError::Builder(BuilderError::InvalidInput(format!(
                "{} tokens for {} values",
                tokens.len(),
                values.len()
            ))));
        }

        let mut requests = Vec::with_capacity(tokens.len());
        for (token, value) in tokens.iter().zip(values) {
            let token = self.parse_token(token)?;
            debug!(
                token = %token.tokenAddress,
                value,
                credited = self.chain.amount_after_fee(*value),
                "building shield"
            );
            requests.push((token, *value));
        }

        Ok(self
            .builder
            .build_shield(self.signer.as_ref(), &self.address()?, &requests)
            .await?)
    }

    /// Shield native ETH through the relay adapter.
    pub async fn shield_native(&self, value: u128) -> Result<TxRequest, AccountError> {
        debug!(
            value,
            credited = self.chain.amount_after_fee(value),
            "building native shield"
        );
        Ok(self
            .builder
            .build_shield_native(self.signer.as_ref(), &self.address()?, value)
            .await?)
    }

    /// Private transfer to a 0zk address.
    pub async fn transfer(
        &self,
        token: &str,
        value: u128,
        receiver: &str,
    ) -> Result<TxRequest, AccountError> {
        let receiver = match Receiver::parse(receiver)? {
            Receiver::Shielded(address) => address,
            Receiver::Public(_) => {
                return Err(AccountError::Builder(BuilderError::BadReceiver(
                    "transfer requires a 0zk receiver".to_string(),
                )))
            }
        };

        let token = self.parse_token(token)?;
        let indexer = self.indexer.read().await;
        let spends = self.collect_spends(&indexer, &token, value)?;
        Ok(self
            .builder
            .build_transfer(&self.keys, spends, &receiver, indexer.forest())
            .await?)
    }

    /// Withdraw a token to a public 0x address.
    pub async fn unshield(
        &self,
        token: &str,
        value: u128,
        receiver: &str,
    ) -> Result<TxRequest, AccountError> {
        let recipient = self.public_receiver(receiver)?;
        let token = self.parse_token(token)?;
        let indexer = self.indexer.read().await;
        let spends = self.collect_spends(&indexer, &token, value)?;
        Ok(self
            .builder
            .build_unshield(&self.keys, spends, recipient, indexer.forest())
            .await?)
    }

    /// Withdraw native ETH through the relay adapter.
    pub async fn unshield_native(
        &self,
        value: u128,
        receiver: &str,
    ) -> Result<TxRequest, AccountError> {
        let recipient = self.public_receiver(receiver)?;
        let token = TokenData::erc20(self.chain.weth);
        let indexer = self.indexer.read().await;
        let spends = self.collect_spends(&indexer, &token, value)?;
        Ok(self
            .builder
            .build_unshield_native(&self.keys, spends, recipient, indexer.forest())
            .await?)
    }

    fn public_receiver(&self, receiver: &str) -> Result<Address, AccountError> {
        match Receiver::parse(receiver)? {
            Receiver::Public(address) => Ok(address),
            Receiver::Shielded(_) => Err(AccountError::Builder(BuilderError::BadReceiver(
                "unshield requires a 0x receiver".to_string(),
            ))),
        }
    }

    fn collect_spends(
        &self,
        indexer: &Indexer,
        token: &TokenData,
        value: u128,
    ) -> Result<Vec<TreeSpend>, AccountError> {
        let mut available = Vec::new();
        for tree_number in indexer.tree_numbers() {
            let notes = indexer.unspent_notes_in_tree(&self.keys, token, tree_number)?;
            if !notes.is_empty() {
                available.push((tree_number, notes));
            }
        }
        Ok(select_notes(&available, value)?)
    }

    fn parse_token(&self, token: &str) -> Result<TokenData, AccountError> {
        let address = if token.eq_ignore_ascii_case("eth") {
            Address::ZERO
        } else {
            Address::from_str(token)
                .map_err(|_| AccountError::InvalidToken(token.to_string()))?
        };
        Ok(TokenData::erc20(self.chain.normalize_token(address)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ShieldedPool;
    use crate::chain::Log;
    use crate::crypto::EcdhKey;
    use crate::indexer::ProcessOptions;
    use crate::note::ShieldNote;
    use crate::signer::MockSigner;
    use crate::storage::snapshot::{AccountSnapshot, ForestSnapshot};
    use crate::tx::prover::{MockProver, ProofRequest, PublicInputs};
    use crate::abi::{G1Point, G2Point, SnarkProof, Transaction};
    use alloy_primitives::{B256, U256};
    use alloy_sol_types::SolEvent;

    fn passthrough(request: &ProofRequest) -> PublicInputs {
        let zero_g1 = G1Point {
            x: U256::ZERO,
            y: U256::ZERO,
        };
        Transaction {
            proof: SnarkProof {
                a: zero_g1.clone(),
                b: G2Point {
                    x: [U256::ZERO, U256::ZERO],
                    y: [U256::ZERO, U256::ZERO],
                },
                c: zero_g1,
            },
            merkleRoot: B256::from(request.merkle_root.to_be_bytes::<32>()),
            nullifiers: request
                .nullifiers
                .iter()
                .map(|n| B256::from(n.to_be_bytes::<32>()))
                .collect(),
            commitments: request
                .commitments
                .iter()
                .map(|c| B256::from(c.to_be_bytes::<32>()))
                .collect(),
            boundParams: request.bound_params.clone(),
            unshieldPreimage: request.unshield_preimage.clone().unwrap_or(
                crate::abi::CommitmentPreimage {
                    npk: B256::ZERO,
                    token: TokenData::erc20(Address::ZERO),
                    value: Default::default(),
                },
            ),
        }
    }

    fn collaborators() -> (Arc<MockProver>, Arc<MockSigner>) {
        let mut prover = MockProver::new();
        prover
            .expect_transact()
            .returning(|request| Ok(passthrough(request)));

        let mut signer = MockSigner::new();
        signer
            .expect_sign_message()
            .returning(|_| Ok(format!("0x{}", "ab".repeat(65))));

        (Arc::new(prover), Arc::new(signer))
    }

    fn shield_log(keys: &AccountKeys, leaf: u64, value: u128, block: u64) -> Log {
        let chain = ChainConfig::mainnet();
        let note = ShieldNote::new(
            keys.master_public_key().unwrap(),
            keys.viewing_public_key(),
            value,
            [leaf as u8 + 1; 16],
            TokenData::erc20(chain.weth),
        );
        let request = note
            .to_request(&EcdhKey::from_bytes([9u8; 32]), [4u8; 16])
            .unwrap();

        let event = ShieldedPool::Shield {
            treeNumber: U256::ZERO,
            startPosition: U256::from(leaf),
            commitments: vec![request.preimage],
            shieldCiphertext: vec![request.ciphertext],
            fees: vec![U256::ZERO],
        };

        Log {
            address: chain.railgun_address,
            topics: vec![ShieldedPool::Shield::SIGNATURE_HASH],
            data: event.encode_data(),
            block_number: block,
            log_index: 0,
        }
    }

    async fn funded_account(notes: &[(u64, u128)]) -> (Account, Arc<RwLock<Indexer>>) {
        let chain = ChainConfig::mainnet();
        let keys = AccountKeys::from_seed([1u8; 32]);
        let indexer = Arc::new(RwLock::new(Indexer::new(chain.clone())));
        let (prover, signer) = collaborators();

        let account = Account::new(keys, chain.clone(), indexer.clone(), prover, signer);
        account.register().await;

        let logs: Vec<Log> = notes
            .iter()
            .map(|(leaf, value)| shield_log(&keys, *leaf, *value, chain.global_start_block + 1))
            .collect();
        indexer
            .write()
            .await
            .process_logs(&logs, &ProcessOptions::default())
            .unwrap();

        (account, indexer)
    }

    fn receiver_0zk() -> String {
        let other = AccountKeys::from_seed([7u8; 32]);
        ZkAddress::new(
            other.master_public_key().unwrap(),
            other.viewing_public_key(),
            1,
        )
        .encode()
        .unwrap()
    }

    #[tokio::test]
    async fn test_address_round_trips() {
        let (account, _) = funded_account(&[]).await;
        let address = account.address().unwrap();
        let encoded = address.encode().unwrap();
        assert_eq!(ZkAddress::from_str(&encoded).unwrap(), address);
        assert_eq!(address.chain_id, 1);
    }

    #[tokio::test]
    async fn test_balance_normalizes_native_aliases() {
        let (account, _) = funded_account(&[(0, 1_000)]).await;

        let weth = ChainConfig::mainnet().weth.to_string();
        assert_eq!(account.balance(&weth).await.unwrap(), 1_000);
        assert_eq!(account.balance("eth").await.unwrap(), 1_000);
        assert_eq!(
            account
                .balance("0x0000000000000000000000000000000000000000")
                .await
                .unwrap(),
            1_000
        );
    }

    #[tokio::test]
    async fn test_transfer_rejects_public_receiver() {
        let (account, _) = funded_account(&[(0, 1_000)]).await;
        let err = account
            .transfer("eth", 100, "0x1234567890123456789012345678901234567890")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccountError::Builder(BuilderError::BadReceiver(_))
        ));
    }

    #[tokio::test]
    async fn test_unshield_rejects_shielded_receiver() {
        let (account, _) = funded_account(&[(0, 1_000)]).await;
        let err = account
            .unshield("eth", 100, &receiver_0zk())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccountError::Builder(BuilderError::BadReceiver(_))
        ));
    }

    #[tokio::test]
    async fn test_garbage_receiver_rejected() {
        let (account, _) = funded_account(&[(0, 1_000)]).await;
        let err = account.transfer("eth", 100, "zr1abcdef").await.unwrap_err();
        assert!(matches!(
            err,
            AccountError::Builder(BuilderError::BadReceiver(_))
        ));
    }

    #[tokio::test]
    async fn test_transfer_insufficient_funds() {
        let (account, _) = funded_account(&[(0, 100)]).await;
        let err = account
            .transfer("eth", 200, &receiver_0zk())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccountError::Builder(BuilderError::InsufficientFunds {
                requested: 200,
                available: 100
            })
        ));
    }

    #[tokio::test]
    async fn test_transfer_builds_pool_calldata() {
        let (account, _) =
            funded_account(&[(0, 70_000_000_000_000_000), (1, 40_000_000_000_000_000)]).await;

        let request = account
            .transfer("eth", 50_000_000_000_000_000, &receiver_0zk())
            .await
            .unwrap();
        assert_eq!(request.to, ChainConfig::mainnet().railgun_address);

        use alloy_sol_types::SolCall;
        let call = ShieldedPool::transactCall::abi_decode(&request.data, true).unwrap();
        assert_eq!(call._transactions.len(), 1);
        assert_eq!(call._transactions[0].nullifiers.len(), 1);
        assert_eq!(call._transactions[0].commitments.len(), 2);
    }

    #[tokio::test]
    async fn test_shield_many_length_mismatch() {
        let (account, _) = funded_account(&[]).await;
        let err = account
            .shield_many(&["eth"], &[1, 2])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccountError::Builder(BuilderError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_restore_reproduces_transfer_calldata() {
        let chain = ChainConfig::mainnet();
        let keys = AccountKeys::from_seed([1u8; 32]);
        let (account, indexer) =
            funded_account(&[(0, 70_000_000_000_000_000), (1, 40_000_000_000_000_000)]).await;
        let account = account.with_builder(
            TxBuilder::new(chain.clone(), collaborators().0).with_deterministic_seed([5u8; 32]),
        );

        let original = account
            .transfer("eth", 50_000_000_000_000_000, &receiver_0zk())
            .await
            .unwrap();

        // Serialize, reload into a fresh indexer, resync zero blocks.
        let (forest_blob, account_blob) = {
            let indexer = indexer.read().await;
            (
                indexer.snapshot().to_bytes().unwrap(),
                indexer.account_snapshot(&keys).unwrap().to_bytes().unwrap(),
            )
        };

        let mut restored = Indexer::from_snapshot(
            chain.clone(),
            ForestSnapshot::from_bytes(&forest_blob).unwrap(),
        );
        restored
            .restore_account(&keys, AccountSnapshot::from_bytes(&account_blob).unwrap())
            .unwrap();
        let restored = Arc::new(RwLock::new(restored));

        let (prover, signer) = collaborators();
        let reloaded = Account::new(keys, chain.clone(), restored, prover.clone(), signer)
            .with_builder(
                TxBuilder::new(chain.clone(), prover).with_deterministic_seed([5u8; 32]),
            );

        assert_eq!(
            reloaded.balance("eth").await.unwrap(),
            110_000_000_000_000_000
        );

        let replayed = reloaded
            .transfer("eth", 50_000_000_000_000_000, &receiver_0zk())
            .await
            .unwrap();
        assert_eq!(replayed, original);
    }
}
