//! Transaction Builder
//!
//! Turns selected notes into wire calldata. Shield paths encrypt fresh
//! notes under a signer-derived shield key; transact paths (transfer,
//! unshield, native unshield) run one proof per contributing tree and
//! assemble `transact`/`relay` calls. All randomness flows through one
//! entropy source so tests can pin it.

use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{aliases::U72, keccak256, Address, FixedBytes, B256, U256};
use alloy_sol_types::SolCall;
use thiserror::Error;

use crate::abi::{
    adapt_params_hash, ActionData, BoundParams, Call, CommitmentCiphertext, RelayAdapt,
    ShieldedPool, TokenData, TokenTransfer, UnshieldType,
};
use crate::account::address::ZkAddress;
use crate::config::ChainConfig;
use crate::crypto::keys::{AccountKeys, EcdhKey, ViewingKey};
use crate::crypto::poseidon::CryptoError;
use crate::crypto::SharedKey;
use crate::merkle::{MerkleError, MerkleForest};
use crate::note::{
    Note, NoteError, OutputNote, ShieldNote, UnshieldNote, SHIELD_KEY_DERIVATION_MESSAGE,
};
use crate::signer::{Signer, SignerError, TxRequest};

use super::prover::{ProofRequest, Prover, ProverError, PublicInputs};

/// Builder errors
#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u128, available: u128 },

    #[error("bad receiver: {0}")]
    BadReceiver(String),

    #[error("prover error: {0}")]
    Prover(#[from] ProverError),

    #[error("signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("note error: {0}")]
    Note(#[from] NoteError),

    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Validated transaction receiver: exactly one of a shielded 0zk address
/// or a public 0x address.
#[derive(Debug, Clone)]
pub enum Receiver {
    Shielded(ZkAddress),
    Public(Address),
}

impl Receiver {
    pub fn parse(raw: &str) -> Result<Receiver, BuilderError> {
        if raw.starts_with("0zk") {
            ZkAddress::decode(raw)
                .map(Receiver::Shielded)
                .map_err(|e| BuilderError::BadReceiver(e.to_string()))
        } else if raw.starts_with("0x") {
            Address::from_str(raw)
                .map(Receiver::Public)
                .map_err(|e| BuilderError::BadReceiver(e.to_string()))
        } else {
            Err(BuilderError::BadReceiver(format!(
                "expected a 0zk or 0x address, got {raw:?}"
            )))
        }
    }
}

/// One tree's contribution to a transaction: the input notes, the value
/// spent toward the target, and the change returned to self.
#[derive(Debug, Clone)]
pub struct TreeSpend {
    pub tree_number: u32,
    pub notes_in: Vec<Note>,
    pub spend_value: u128,
    pub change_value: u128,
}

/// Greedy note selection, tree by tree: within each tree take notes in
/// stored order until the running sum covers what is still needed. The
/// tree where the sum first overshoots emits the change.
pub fn select_notes(
    available: &[(u32, Vec<Note>)],
    requested: u128,
) -> Result<Vec<TreeSpend>, BuilderError> {
    let mut remaining = requested;
    let mut spends = Vec::new();

    for (tree_number, notes) in available {
        if remaining == 0 {
            break;
        }

        let mut picked = Vec::new();
        let mut sum = 0u128;
        for note in notes {
            if sum >= remaining {
                break;
            }
            sum += note.value();
            picked.push(note.clone());
        }
        if picked.is_empty() {
            continue;
        }

        let spend_value = sum.min(remaining);
        spends.push(TreeSpend {
            tree_number: *tree_number,
            notes_in: picked,
            spend_value,
            change_value: sum - spend_value,
        });
        remaining -= spend_value;
    }

    if remaining > 0 {
        let available_total = available
            .iter()
            .flat_map(|(_, notes)| notes)
            .map(|note| note.value())
            .sum();
        return Err(BuilderError::InsufficientFunds {
            requested,
            available: available_total,
        });
    }

    Ok(spends)
}

enum TransactTarget {
    Send(ZkAddress),
    Unshield { recipient: Address },
}

/// Deterministic-capable randomness. Seeded mode derives a keccak
/// stream; otherwise the OS RNG backs every draw.
struct Entropy {
    seed: Option<[u8; 32]>,
    counter: u64,
}

impl Entropy {
    fn new(seed: Option<[u8; 32]>) -> Self {
        Entropy { seed, counter: 0 }
    }

    fn bytes32(&mut self) -> [u8; 32] {
        match self.seed {
            Some(seed) => {
                self.counter += 1;
                let mut buf = [0u8; 40];
                buf[..32].copy_from_slice(&seed);
                buf[32..].copy_from_slice(&self.counter.to_be_bytes());
                keccak256(buf).0
            }
            None => rand::random(),
        }
    }

    fn bytes16(&mut self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out.copy_from_slice(&self.bytes32()[..16]);
        out
    }

    fn bytes31(&mut self) -> [u8; 31] {
        let mut out = [0u8; 31];
        out.copy_from_slice(&self.bytes32()[..31]);
        out
    }
}

fn annotation_key(viewing: &ViewingKey) -> SharedKey {
    SharedKey::from_bytes(keccak256(viewing.as_bytes()).0)
}

fn seal_annotation(viewing: &ViewingKey, iv: [u8; 16], random: [u8; 16]) -> Vec<u8> {
    let mut data = iv.to_vec();
    data.extend_from_slice(&annotation_key(viewing).apply_ctr(&iv, &random));
    data
}

/// Recover the note random from sender annotation data. Returns `None`
/// when the blob is not the expected 32 bytes.
pub fn open_annotation(viewing: &ViewingKey, data: &[u8]) -> Option<[u8; 16]> {
    if data.len() != 32 {
        return None;
    }
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&data[..16]);

    let plain = annotation_key(viewing).apply_ctr(&iv, &data[16..]);
    let mut random = [0u8; 16];
    random.copy_from_slice(&plain);
    Some(random)
}

/// Calldata builder for one chain.
pub struct TxBuilder {
    chain: ChainConfig,
    prover: Arc<dyn Prover>,
    min_gas_price: u128,
    min_gas_limit: u64,
    deterministic_seed: Option<[u8; 32]>,
}

impl TxBuilder {
    pub fn new(chain: ChainConfig, prover: Arc<dyn Prover>) -> Self {
        TxBuilder {
            chain,
            prover,
            min_gas_price: 0,
            min_gas_limit: 300_000,
            deterministic_seed: None,
        }
    }

    pub fn with_min_gas_price(mut self, min_gas_price: u128) -> Self {
        self.min_gas_price = min_gas_price;
        self
    }

    /// Gas floor the relay adapter enforces for its action calls.
    pub fn with_min_gas_limit(mut self, min_gas_limit: u64) -> Self {
        self.min_gas_limit = min_gas_limit;
        self
    }

    /// Pin all randomness (note randoms, ephemeral keys, relay salts) to
    /// a keccak stream. Reproducible-calldata hook for tests and replay
    /// inspection; never use a predictable seed on a live chain.
    pub fn with_deterministic_seed(mut self, seed: [u8; 32]) -> Self {
        self.deterministic_seed = Some(seed);
        self
    }

    /// Shield one or many (token, value) pairs into the pool.
    pub async fn build_shield(
        &self,
        signer: &dyn Signer,
        receiver: &ZkAddress,
        requests: &[(TokenData, u128)],
    ) -> Result<TxRequest, BuilderError> {
        if requests.is_empty() {
            return Err(BuilderError::InvalidInput("no shield requests".to_string()));
        }

        let shield_key = self.derive_shield_key(signer).await?;
        let mut entropy = Entropy::new(self.deterministic_seed);

        let mut shield_requests = Vec::with_capacity(requests.len());
        for (token, value) in requests {
            let note = ShieldNote::new(
                receiver.master_public_key,
                receiver.viewing_public_key,
                *value,
                entropy.bytes16(),
                token.clone(),
            );
            shield_requests.push(note.to_request(&shield_key, entropy.bytes16())?);
        }

        let data = ShieldedPool::shieldCall {
            _shieldRequests: shield_requests,
        }
        .abi_encode();

        Ok(TxRequest::new(self.chain.railgun_address, data))
    }

    /// Shield native ETH: wrap then shield, composed through the relay
    /// adapter with the native amount on the outer call.
    pub async fn build_shield_native(
        &self,
        signer: &dyn Signer,
        receiver: &ZkAddress,
        value: u128,
    ) -> Result<TxRequest, BuilderError> {
        let shield_key = self.derive_shield_key(signer).await?;
        let mut entropy = Entropy::new(self.deterministic_seed);

        let note = ShieldNote::new(
            receiver.master_public_key,
            receiver.viewing_public_key,
            value,
            entropy.bytes16(),
            TokenData::erc20(self.chain.weth),
        );
        let request = note.to_request(&shield_key, entropy.bytes16())?;

        let calls = vec![
            Call {
                to: self.chain.relay_adapt_address,
                data: RelayAdapt::wrapBaseCall {
                    _amount: U256::from(value),
                }
                .abi_encode()
                .into(),
                value: U256::ZERO,
            },
            Call {
                to: self.chain.railgun_address,
                data: ShieldedPool::shieldCall {
                    _shieldRequests: vec![request],
                }
                .abi_encode()
                .into(),
                value: U256::ZERO,
            },
        ];

        let data = RelayAdapt::multicallCall {
            _requireSuccess: true,
            _calls: calls,
        }
        .abi_encode();

        Ok(TxRequest::new(self.chain.relay_adapt_address, data).with_value(U256::from(value)))
    }

    /// Private-to-private transfer to a 0zk address.
    pub async fn build_transfer(
        &self,
        keys: &AccountKeys,
        spends: Vec<TreeSpend>,
        receiver: &ZkAddress,
        forest: &MerkleForest,
    ) -> Result<TxRequest, BuilderError> {
        let mut entropy = Entropy::new(self.deterministic_seed);
        let transactions = self
            .prove_spends(
                keys,
                &spends,
                &TransactTarget::Send(*receiver),
                Address::ZERO,
                B256::ZERO,
                UnshieldType::NONE,
                forest,
                &mut entropy,
            )
            .await?;

        let data = ShieldedPool::transactCall {
            _transactions: transactions,
        }
        .abi_encode();
        Ok(TxRequest::new(self.chain.railgun_address, data))
    }

    /// Unshield an ERC20 to a public address.
    pub async fn build_unshield(
        &self,
        keys: &AccountKeys,
        spends: Vec<TreeSpend>,
        recipient: Address,
        forest: &MerkleForest,
    ) -> Result<TxRequest, BuilderError> {
        let mut entropy = Entropy::new(self.deterministic_seed);
        let transactions = self
            .prove_spends(
                keys,
                &spends,
                &TransactTarget::Unshield { recipient },
                Address::ZERO,
                B256::ZERO,
                UnshieldType::NORMAL,
                forest,
                &mut entropy,
            )
            .await?;

        let data = ShieldedPool::transactCall {
            _transactions: transactions,
        }
        .abi_encode();
        Ok(TxRequest::new(self.chain.railgun_address, data))
    }

    /// Unshield to native ETH: the pool pays wrapped tokens to the relay
    /// adapter, which unwraps and forwards the whole balance to the
    /// recipient. The adapt-params hash binds the proofs to exactly that
    /// action.
    pub async fn build_unshield_native(
        &self,
        keys: &AccountKeys,
        spends: Vec<TreeSpend>,
        recipient: Address,
        forest: &MerkleForest,
    ) -> Result<TxRequest, BuilderError> {
        let mut entropy = Entropy::new(self.deterministic_seed);

        let mut nullifiers_2d = Vec::with_capacity(spends.len());
        for spend in &spends {
            let mut tree_nullifiers = Vec::with_capacity(spend.notes_in.len());
            for note in &spend.notes_in {
                tree_nullifiers.push(B256::from(note.nullifier()?.to_be_bytes::<32>()));
            }
            nullifiers_2d.push(tree_nullifiers);
        }

        let action_data = ActionData {
            random: FixedBytes::from(entropy.bytes31()),
            requireSuccess: true,
            minGasLimit: U256::from(self.min_gas_limit),
            calls: vec![
                Call {
                    to: self.chain.relay_adapt_address,
                    data: RelayAdapt::unwrapBaseCall {
                        _amount: U256::ZERO,
                    }
                    .abi_encode()
                    .into(),
                    value: U256::ZERO,
                },
                Call {
                    to: self.chain.relay_adapt_address,
                    data: RelayAdapt::transferCall {
                        _transfers: vec![TokenTransfer {
                            token: TokenData::erc20(Address::ZERO),
                            to: recipient,
                            value: U256::ZERO,
                        }],
                    }
                    .abi_encode()
                    .into(),
                    value: U256::ZERO,
                },
            ],
        };

        let adapt_params = adapt_params_hash(&nullifiers_2d, spends.len(), &action_data);

        // The unshield output pays the adapter; the action forwards it.
        let transactions = self
            .prove_spends(
                keys,
                &spends,
                &TransactTarget::Unshield {
                    recipient: self.chain.relay_adapt_address,
                },
                self.chain.relay_adapt_address,
                adapt_params,
                UnshieldType::NORMAL,
                forest,
                &mut entropy,
            )
            .await?;

        let data = RelayAdapt::relayCall {
            _transactions: transactions,
            _actionData: action_data,
        }
        .abi_encode();
        Ok(TxRequest::new(self.chain.relay_adapt_address, data))
    }

    /// One proof per contributing tree. Outputs are ordered change
    /// first, then the target output; an unshield output goes last and
    /// carries no ciphertext.
    #[allow(clippy::too_many_arguments)]
    async fn prove_spends(
        &self,
        keys: &AccountKeys,
        spends: &[TreeSpend],
        target: &TransactTarget,
        adapt_contract: Address,
        adapt_params: B256,
        unshield: UnshieldType,
        forest: &MerkleForest,
        entropy: &mut Entropy,
    ) -> Result<Vec<PublicInputs>, BuilderError> {
        if spends.is_empty() {
            return Err(BuilderError::InvalidInput(
                "no input notes selected".to_string(),
            ));
        }

        let sender_master = keys.master_public_key()?;
        let sender_viewing = keys.viewing_public_key();

        let mut transactions = Vec::with_capacity(spends.len());
        for spend in spends {
            let token = spend.notes_in[0].token().clone();
            let mut commitments = Vec::new();
            let mut ciphertexts = Vec::new();
            let mut unshield_preimage = None;

            if spend.change_value > 0 {
                let change = OutputNote::new(
                    sender_master,
                    sender_viewing,
                    spend.change_value,
                    entropy.bytes16(),
                    token.clone(),
                    String::new(),
                );
                commitments.push(change.commitment()?);
                ciphertexts.push(self.seal_output(keys, &change, entropy)?);
            }

            match target {
                TransactTarget::Send(address) => {
                    let send = OutputNote::new(
                        address.master_public_key,
                        address.viewing_public_key,
                        spend.spend_value,
                        entropy.bytes16(),
                        token.clone(),
                        String::new(),
                    );
                    commitments.push(send.commitment()?);
                    ciphertexts.push(self.seal_output(keys, &send, entropy)?);
                }
                TransactTarget::Unshield { recipient } => {
                    let note = UnshieldNote::new(*recipient, spend.spend_value, token.clone());
                    commitments.push(note.commitment()?);
                    unshield_preimage = Some(note.preimage());
                }
            }

            let bound_params = BoundParams {
                treeNumber: spend.tree_number as u16,
                minGasPrice: U72::saturating_from(self.min_gas_price),
                unshield,
                chainID: self.chain.chain_id,
                adaptContract: adapt_contract,
                adaptParams: adapt_params,
                commitmentCiphertext: ciphertexts,
            };

            let merkle_root = forest.root(spend.tree_number)?;
            let mut nullifiers = Vec::with_capacity(spend.notes_in.len());
            let mut merkle_proofs = Vec::with_capacity(spend.notes_in.len());
            for note in &spend.notes_in {
                nullifiers.push(note.nullifier()?);
                merkle_proofs.push(forest.proof(spend.tree_number, note.commitment()?)?);
            }

            let request = ProofRequest {
                tree_number: spend.tree_number,
                merkle_root,
                nullifiers,
                commitments,
                bound_params,
                unshield_preimage,
                notes_in: spend.notes_in.clone(),
                merkle_proofs,
            };

            transactions.push(self.prover.transact(&request).await?);
        }

        Ok(transactions)
    }

    fn seal_output(
        &self,
        keys: &AccountKeys,
        output: &OutputNote,
        entropy: &mut Entropy,
    ) -> Result<CommitmentCiphertext, BuilderError> {
        let ephemeral = EcdhKey::from_bytes(entropy.bytes32());
        let annotation = seal_annotation(&keys.viewing_key(), entropy.bytes16(), output.random());
        Ok(output.encrypt(&ephemeral, entropy.bytes16(), annotation)?)
    }

    /// Shield private key: keccak256 of the signer's signature over the
    /// fixed derivation message.
    async fn derive_shield_key(&self, signer: &dyn Signer) -> Result<EcdhKey, BuilderError> {
        let signature = signer
            .sign_message(SHIELD_KEY_DERIVATION_MESSAGE.as_bytes())
            .await?;
        let bytes = hex::decode(signature.trim_start_matches("0x")).map_err(|e| {
            BuilderError::Signer(SignerError::InvalidSignature(e.to_string()))
        })?;
        Ok(EcdhKey::from_bytes(keccak256(&bytes).0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{G1Point, G2Point, SnarkProof, Transaction};
    use crate::note::NoteOrigin;
    use crate::signer::MockSigner;
    use crate::tx::prover::MockProver;
    use alloy_primitives::address;

    fn weth() -> TokenData {
        TokenData::erc20(ChainConfig::mainnet().weth)
    }

    fn keys() -> AccountKeys {
        AccountKeys::from_seed([1u8; 32])
    }

    fn note_in_tree(keys: &AccountKeys, tree: u32, leaf: u32, value: u128) -> Note {
        Note::new(
            *keys,
            tree,
            leaf,
            [leaf as u8 + 1; 16],
            value,
            weth(),
            String::new(),
            NoteOrigin::Shield,
        )
    }

    /// Builds the payload straight from the request; proof points stay
    /// zero.
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

    fn mock_prover() -> Arc<MockProver> {
        let mut prover = MockProver::new();
        prover
            .expect_transact()
            .returning(|request| Ok(passthrough(request)));
        Arc::new(prover)
    }

    fn forest_with_notes(notes: &[Note]) -> MerkleForest {
        let mut forest = MerkleForest::new();
        for note in notes {
            forest
                .insert_leaves(
                    note.tree_number(),
                    note.leaf_index() as usize,
                    &[note.commitment().unwrap()],
                )
                .unwrap();
        }
        forest.rebuild_dirty().unwrap();
        forest
    }

    fn receiver_address() -> ZkAddress {
        let other = AccountKeys::from_seed([7u8; 32]);
        ZkAddress::new(
            other.master_public_key().unwrap(),
            other.viewing_public_key(),
            1,
        )
    }

    #[test]
    fn test_select_notes_greedy_with_change() {
        let keys = keys();
        let available = vec![(
            0u32,
            vec![
                note_in_tree(&keys, 0, 0, 70_000_000_000_000_000),
                note_in_tree(&keys, 0, 1, 40_000_000_000_000_000),
            ],
        )];

        let spends = select_notes(&available, 50_000_000_000_000_000).unwrap();
        assert_eq!(spends.len(), 1);
        assert_eq!(spends[0].notes_in.len(), 1);
        assert_eq!(spends[0].spend_value, 50_000_000_000_000_000);
        assert_eq!(spends[0].change_value, 20_000_000_000_000_000);
    }

    #[test]
    fn test_select_notes_spans_trees() {
        let keys = keys();
        let available = vec![
            (0u32, vec![note_in_tree(&keys, 0, 0, 30)]),
            (1u32, vec![note_in_tree(&keys, 1, 0, 30)]),
        ];

        let spends = select_notes(&available, 50).unwrap();
        assert_eq!(spends.len(), 2);
        assert_eq!(spends[0].spend_value, 30);
        assert_eq!(spends[0].change_value, 0);
        assert_eq!(spends[1].spend_value, 20);
        assert_eq!(spends[1].change_value, 10);
    }

    #[test]
    fn test_select_notes_insufficient() {
        let keys = keys();
        let available = vec![(0u32, vec![note_in_tree(&keys, 0, 0, 30)])];

        let err = select_notes(&available, 50).unwrap_err();
        assert!(matches!(
            err,
            BuilderError::InsufficientFunds {
                requested: 50,
                available: 30
            }
        ));
    }

    #[test]
    fn test_receiver_parse() {
        assert!(matches!(
            Receiver::parse(&receiver_address().encode().unwrap()),
            Ok(Receiver::Shielded(_))
        ));
        assert!(matches!(
            Receiver::parse("0x1234567890123456789012345678901234567890"),
            Ok(Receiver::Public(_))
        ));
        assert!(matches!(
            Receiver::parse("bc1qxyz"),
            Err(BuilderError::BadReceiver(_))
        ));
    }

    #[tokio::test]
    async fn test_transfer_with_change_conserves_value() {
        let keys = keys();
        let notes = vec![
            note_in_tree(&keys, 0, 0, 70_000_000_000_000_000),
            note_in_tree(&keys, 0, 1, 40_000_000_000_000_000),
        ];
        let forest = forest_with_notes(&notes);

        let available = vec![(0u32, notes)];
        let spends = select_notes(&available, 50_000_000_000_000_000).unwrap();
        let input_total: u128 = spends[0].notes_in.iter().map(|n| n.value()).sum();

        let builder = TxBuilder::new(ChainConfig::mainnet(), mock_prover());
        let request = builder
            .build_transfer(&keys, spends, &receiver_address(), &forest)
            .await
            .unwrap();

        assert_eq!(request.to, ChainConfig::mainnet().railgun_address);
        assert_eq!(request.value, U256::ZERO);

        let call = ShieldedPool::transactCall::abi_decode(&request.data, true).unwrap();
        assert_eq!(call._transactions.len(), 1);
        let tx = &call._transactions[0];

        // notesIn = [note7]; notesOut = [change 2e16, send 5e16].
        assert_eq!(tx.nullifiers.len(), 1);
        assert_eq!(tx.commitments.len(), 2);
        assert_eq!(tx.boundParams.commitmentCiphertext.len(), 2);
        assert_eq!(tx.boundParams.unshield, UnshieldType::NONE);
        assert_eq!(tx.boundParams.adaptContract, Address::ZERO);

        // Conservation: inputs == change + transferred.
        assert_eq!(
            input_total,
            20_000_000_000_000_000u128 + 50_000_000_000_000_000u128
        );
    }

    #[tokio::test]
    async fn test_change_note_decryptable_by_sender() {
        let keys = keys();
        let notes = vec![note_in_tree(&keys, 0, 0, 70)];
        let forest = forest_with_notes(&notes);
        let spends = select_notes(&[(0u32, notes)], 50).unwrap();

        let builder = TxBuilder::new(ChainConfig::mainnet(), mock_prover());
        let request = builder
            .build_transfer(&keys, spends, &receiver_address(), &forest)
            .await
            .unwrap();

        let call = ShieldedPool::transactCall::abi_decode(&request.data, true).unwrap();
        let ciphertexts = &call._transactions[0].boundParams.commitmentCiphertext;

        // Change ciphertext decrypts for the sender; send ciphertext for
        // the receiver.
        let change = Note::decrypt_transact(&keys, 0, 0, &ciphertexts[0]).unwrap();
        assert_eq!(change.value(), 20);

        let receiver_keys = AccountKeys::from_seed([7u8; 32]);
        let sent = Note::decrypt_transact(&receiver_keys, 0, 1, &ciphertexts[1]).unwrap();
        assert_eq!(sent.value(), 50);

        // Sender annotation recovers the change note random.
        let random = open_annotation(
            &keys.viewing_key(),
            ciphertexts[0].annotationData.as_ref(),
        )
        .unwrap();
        assert_eq!(random, change.random());
    }

    #[tokio::test]
    async fn test_unshield_targets_pool_with_preimage() {
        let keys = keys();
        let notes = vec![note_in_tree(&keys, 0, 0, 100)];
        let forest = forest_with_notes(&notes);
        let spends = select_notes(&[(0u32, notes)], 100).unwrap();

        let recipient = address!("2222222222222222222222222222222222222222");
        let builder = TxBuilder::new(ChainConfig::mainnet(), mock_prover());
        let request = builder
            .build_unshield(&keys, spends, recipient, &forest)
            .await
            .unwrap();

        assert_eq!(request.to, ChainConfig::mainnet().railgun_address);
        let call = ShieldedPool::transactCall::abi_decode(&request.data, true).unwrap();
        let tx = &call._transactions[0];

        assert_eq!(tx.boundParams.unshield, UnshieldType::NORMAL);
        // No change: single unshield commitment, no ciphertext entry.
        assert_eq!(tx.commitments.len(), 1);
        assert!(tx.boundParams.commitmentCiphertext.is_empty());
        assert_eq!(
            tx.unshieldPreimage.npk,
            B256::from(UnshieldNote::new(recipient, 100, weth()).note_public_key().to_be_bytes::<32>())
        );
    }

    #[tokio::test]
    async fn test_native_unshield_relay_payload() {
        let keys = keys();
        let value = 60_000_000_000_000_000u128;
        let notes = vec![note_in_tree(&keys, 0, 0, 100_000_000_000_000_000)];
        let forest = forest_with_notes(&notes);
        let spends = select_notes(&[(0u32, notes)], value).unwrap();

        let recipient = address!("3333333333333333333333333333333333333333");
        let chain = ChainConfig::mainnet();
        let builder = TxBuilder::new(chain.clone(), mock_prover());
        let request = builder
            .build_unshield_native(&keys, spends, recipient, &forest)
            .await
            .unwrap();

        assert_eq!(request.to, chain.relay_adapt_address);

        let call = RelayAdapt::relayCall::abi_decode(&request.data, true).unwrap();
        let action = &call._actionData;
        assert!(action.requireSuccess);
        assert_eq!(action.calls.len(), 2);

        // unwrapBase(0), then transfer(token=0, to=recipient, value=0).
        let unwrap = RelayAdapt::unwrapBaseCall::abi_decode(&action.calls[0].data, true).unwrap();
        assert_eq!(unwrap._amount, U256::ZERO);
        let transfer = RelayAdapt::transferCall::abi_decode(&action.calls[1].data, true).unwrap();
        assert_eq!(transfer._transfers[0].to, recipient);
        assert_eq!(transfer._transfers[0].value, U256::ZERO);
        assert_eq!(transfer._transfers[0].token.tokenAddress, Address::ZERO);

        // Adapt-params binding recomputes from the decoded payload.
        let nullifiers_2d: Vec<Vec<B256>> = call
            ._transactions
            .iter()
            .map(|tx| tx.nullifiers.clone())
            .collect();
        let expected = adapt_params_hash(&nullifiers_2d, call._transactions.len(), action);
        assert_eq!(call._transactions[0].boundParams.adaptParams, expected);
        assert_eq!(
            call._transactions[0].boundParams.adaptContract,
            chain.relay_adapt_address
        );
    }

    #[tokio::test]
    async fn test_deterministic_seed_reproduces_calldata() {
        let keys = keys();
        let notes = vec![note_in_tree(&keys, 0, 0, 70)];
        let forest = forest_with_notes(&notes);

        let mut requests = Vec::new();
        for _ in 0..2 {
            let spends = select_notes(&[(0u32, notes.clone())], 50).unwrap();
            let builder = TxBuilder::new(ChainConfig::mainnet(), mock_prover())
                .with_deterministic_seed([42u8; 32]);
            requests.push(
                builder
                    .build_transfer(&keys, spends, &receiver_address(), &forest)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(requests[0], requests[1]);
    }

    #[tokio::test]
    async fn test_shield_calldata_and_key_derivation() {
        let receiver = receiver_address();
        let mut signer = MockSigner::new();
        signer
            .expect_sign_message()
            .withf(|message| message == SHIELD_KEY_DERIVATION_MESSAGE.as_bytes())
            .returning(|_| Ok(format!("0x{}", "ab".repeat(65))));

        let builder = TxBuilder::new(ChainConfig::mainnet(), mock_prover())
            .with_deterministic_seed([1u8; 32]);
        let request = builder
            .build_shield(&signer, &receiver, &[(weth(), 1_000)])
            .await
            .unwrap();

        assert_eq!(request.to, ChainConfig::mainnet().railgun_address);
        assert_eq!(request.value, U256::ZERO);

        let call = ShieldedPool::shieldCall::abi_decode(&request.data, true).unwrap();
        assert_eq!(call._shieldRequests.len(), 1);

        // The receiver can decrypt its own shield.
        let receiver_keys = AccountKeys::from_seed([7u8; 32]);
        let note =
            Note::decrypt_shield(&receiver_keys, 0, 0, &call._shieldRequests[0]).unwrap();
        assert_eq!(note.value(), 1_000);
    }

    #[tokio::test]
    async fn test_shield_native_wraps_then_shields() {
        let receiver = receiver_address();
        let mut signer = MockSigner::new();
        signer
            .expect_sign_message()
            .returning(|_| Ok(format!("0x{}", "cd".repeat(65))));

        let chain = ChainConfig::mainnet();
        let value = 500_000_000_000_000_000u128;
        let builder = TxBuilder::new(chain.clone(), mock_prover());
        let request = builder
            .build_shield_native(&signer, &receiver, value)
            .await
            .unwrap();

        assert_eq!(request.to, chain.relay_adapt_address);
        assert_eq!(request.value, U256::from(value));

        let call = RelayAdapt::multicallCall::abi_decode(&request.data, true).unwrap();
        assert!(call._requireSuccess);
        assert_eq!(call._calls.len(), 2);
        assert_eq!(call._calls[0].to, chain.relay_adapt_address);
        assert_eq!(call._calls[1].to, chain.railgun_address);

        let wrap = RelayAdapt::wrapBaseCall::abi_decode(&call._calls[0].data, true).unwrap();
        assert_eq!(wrap._amount, U256::from(value));
        assert!(ShieldedPool::shieldCall::abi_decode(&call._calls[1].data, true).is_ok());
    }

    #[tokio::test]
    async fn test_prover_error_surfaces() {
        let keys = keys();
        let notes = vec![note_in_tree(&keys, 0, 0, 70)];
        let forest = forest_with_notes(&notes);
        let spends = select_notes(&[(0u32, notes)], 50).unwrap();

        let mut prover = MockProver::new();
        prover.expect_transact().returning(|_| {
            Err(ProverError::ProvingFailed("witness rejected".to_string()))
        });

        let builder = TxBuilder::new(ChainConfig::mainnet(), Arc::new(prover));
        let err = builder
            .build_transfer(&keys, spends, &receiver_address(), &forest)
            .await
            .unwrap_err();
        assert!(matches!(err, BuilderError::Prover(_)));
    }
}
