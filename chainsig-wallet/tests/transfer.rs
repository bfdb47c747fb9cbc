//! End-to-end transfer tests against a simulated signing service.
//!
//! The simulator holds the root secret and applies the same additive tweak
//! the real MPC network applies to its key shares, so every signature it
//! returns is genuinely verifiable against the derived child key. Decoding
//! the assembled transactions with the chains' own codecs closes the loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::consensus;
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::U256;
use ethers_core::utils::rlp::Rlp;
use k256::ecdsa::SigningKey;
use k256::{ProjectivePoint, PublicKey, Scalar};

use chainsig_wallet::address::{BtcAddressKind, BtcNetwork, BtcParams, Chain, ChainConfig};
use chainsig_wallet::assembler;
use chainsig_wallet::signer::{
    RequestId, SignRequest, SignStatus, SignatureResponse, SignerConfig, SignerTransport,
    SigningClient,
};
use chainsig_wallet::transaction::{
    self, BtcChainState, ChainState, EthChainState, SignedTransaction, UnsignedTransaction, Utxo,
};
use chainsig_wallet::wallet::{Broadcaster, ChainStateProvider, RootKeyProvider};
use chainsig_wallet::{
    derive_child_key, derive_epsilon, Error, Result, RootPublicKey, TransferRequest, Wallet,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const ACCOUNT: &str = "alice.test";
const FUNDING_TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

fn root_sk() -> Scalar {
    Scalar::from(0xC0FFEEu64)
}

fn root_key() -> RootPublicKey {
    let point = ProjectivePoint::GENERATOR * root_sk();
    RootPublicKey::new(PublicKey::from_affine(point.to_affine()).expect("non-identity point"))
}

/// How the simulated signer behaves once polled.
#[derive(Debug, Clone, Copy)]
enum SignerBehavior {
    /// Complete after `delay_polls` pending responses
    Normal { delay_polls: u32 },
    /// Stay pending forever
    NeverComplete,
    /// Sign a different digest than the one requested
    CorruptPayload,
}

/// In-process stand-in for the MPC signing service.
struct SimSigner {
    root_sk: Scalar,
    account_id: String,
    behavior: SignerBehavior,
    requests: Mutex<HashMap<RequestId, (SignRequest, u32)>>,
    next_id: AtomicU32,
}

impl SimSigner {
    fn new(behavior: SignerBehavior) -> Self {
        Self {
            root_sk: root_sk(),
            account_id: ACCOUNT.to_string(),
            behavior,
            requests: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(0),
        }
    }

    fn sign(&self, request: &SignRequest) -> SignStatus {
        let epsilon =
            match derive_epsilon(&self.account_id, &request.path, request.key_version) {
                Ok(e) => e,
                Err(e) => return SignStatus::Failed(e.to_string()),
            };
        let child_sk = self.root_sk + epsilon;
        let signing_key =
            SigningKey::from_bytes(&child_sk.to_bytes()).expect("tweaked key is nonzero");

        let mut payload = request.payload;
        if matches!(self.behavior, SignerBehavior::CorruptPayload) {
            payload[0] ^= 0xFF;
        }

        let (sig, recid) = signing_key
            .sign_prehash_recoverable(&payload)
            .expect("prehash signing");

        let bytes = sig.to_bytes();
        let mut big_r = [0u8; 33];
        big_r[0] = if recid.is_y_odd() { 0x03 } else { 0x02 };
        big_r[1..].copy_from_slice(&bytes[..32]);
        let mut s = [0u8; 32];
        s.copy_from_slice(&bytes[32..]);

        SignStatus::Completed(SignatureResponse::from_raw_parts(&big_r, &s, recid.to_byte()))
    }
}

#[async_trait]
impl SignerTransport for SimSigner {
    async fn submit(&self, request: &SignRequest) -> Result<RequestId> {
        let id = format!("req-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.requests
            .lock()
            .expect("lock poisoned")
            .insert(id.clone(), (request.clone(), 0));
        Ok(id)
    }

    async fn poll(&self, id: &RequestId) -> Result<SignStatus> {
        let request = {
            let mut requests = self.requests.lock().expect("lock poisoned");
            let (request, polls) = requests
                .get_mut(id)
                .ok_or_else(|| Error::Transport(format!("unknown request id {id}")))?;
            *polls += 1;
            match self.behavior {
                SignerBehavior::NeverComplete => return Ok(SignStatus::Pending),
                SignerBehavior::Normal { delay_polls } if *polls <= delay_polls => {
                    return Ok(SignStatus::Pending)
                }
                _ => request.clone(),
            }
        };
        Ok(self.sign(&request))
    }
}

struct CountingRootKeys {
    key: RootPublicKey,
    fetches: AtomicU32,
}

#[async_trait]
impl RootKeyProvider for CountingRootKeys {
    async fn fetch_root_public_key(&self) -> Result<RootPublicKey> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.key.clone())
    }
}

#[derive(Default)]
struct RecordingBroadcaster {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn broadcast(&self, tx: &SignedTransaction) -> Result<String> {
        let mut sent = self.sent.lock().expect("lock poisoned");
        sent.push(tx.raw_hex());
        Ok(format!("txid-{}", sent.len()))
    }
}

struct FixedChainState(ChainState);

#[async_trait]
impl ChainStateProvider for FixedChainState {
    async fn fetch_chain_state(&self, _chain: Chain, _address: &str) -> Result<ChainState> {
        Ok(self.0.clone())
    }
}

fn fast_config() -> SignerConfig {
    SignerConfig {
        timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(1),
        max_poll_interval: Duration::from_millis(5),
    }
}

fn eth_state() -> ChainState {
    ChainState::Ethereum(EthChainState {
        nonce: Some(U256::from(7)),
        chain_id: Some(11155111),
        max_fee_per_gas: Some(U256::from(30_000_000_000u64)),
        max_priority_fee_per_gas: Some(U256::from(1_000_000_000u64)),
        gas_limit: Some(U256::from(21_000)),
    })
}

fn btc_state() -> ChainState {
    ChainState::Bitcoin(BtcChainState {
        utxos: vec![Utxo {
            txid: FUNDING_TXID.to_string(),
            vout: 0,
            value_sat: 100_000,
        }],
        fee_sat: Some(500),
    })
}

fn btc_config(kind: BtcAddressKind) -> ChainConfig {
    ChainConfig::Bitcoin(BtcParams {
        network: BtcNetwork::Testnet,
        kind,
    })
}

type TestWallet = Wallet<Arc<CountingRootKeys>, FixedChainState, SimSigner>;

fn wallet_with(
    behavior: SignerBehavior,
    state: ChainState,
    config: SignerConfig,
) -> (TestWallet, Arc<CountingRootKeys>) {
    let root_keys = Arc::new(CountingRootKeys {
        key: root_key(),
        fetches: AtomicU32::new(0),
    });
    let wallet = Wallet::new(
        root_keys.clone(),
        FixedChainState(state),
        SigningClient::new(SimSigner::new(behavior), config),
    );
    (wallet, root_keys)
}

fn btc_recipient() -> String {
    let point = ProjectivePoint::GENERATOR * Scalar::from(999u64);
    let root = RootPublicKey::new(PublicKey::from_affine(point.to_affine()).unwrap());
    let child = derive_child_key(&root, "bob.test", "bitcoin-1", 0).unwrap();
    let params = BtcParams {
        network: BtcNetwork::Testnet,
        kind: BtcAddressKind::Legacy,
    };
    chainsig_wallet::address::bitcoin::encode(&child, &params).unwrap()
}

fn transfer_request(chain: ChainConfig, path: &str, recipient: &str, amount: u128) -> TransferRequest {
    TransferRequest {
        account_id: ACCOUNT.to_string(),
        path: path.to_string(),
        key_version: 0,
        chain,
        recipient: recipient.to_string(),
        amount,
    }
}

#[tokio::test]
async fn test_ethereum_transfer_round_trip() {
    init_tracing();
    let (wallet, _) = wallet_with(SignerBehavior::Normal { delay_polls: 2 }, eth_state(), fast_config());
    let amount = 1_000_000_000_000_000u128;
    let request = transfer_request(
        ChainConfig::Ethereum,
        "ethereum-1",
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        amount,
    );

    let signed = wallet.create_transfer(&request).await.unwrap();
    assert_eq!(signed.chain, Chain::Ethereum);

    let (decoded, sig) = TypedTransaction::decode_signed(&Rlp::new(&signed.raw)).unwrap();
    let recovered = sig.recover(decoded.sighash()).unwrap();

    let sender = wallet
        .derive_address(ACCOUNT, "ethereum-1", 0, &ChainConfig::Ethereum)
        .await
        .unwrap();
    assert_eq!(format!("{recovered:?}"), sender.address.to_lowercase());

    // A sibling path must map to a different signer
    let other = wallet
        .derive_address(ACCOUNT, "ethereum-2", 0, &ChainConfig::Ethereum)
        .await
        .unwrap();
    assert_ne!(format!("{recovered:?}"), other.address.to_lowercase());

    match decoded {
        TypedTransaction::Eip1559(tx) => {
            assert_eq!(tx.value, Some(U256::from(amount)));
            assert_eq!(tx.chain_id, Some(ethers_core::types::U64::from(11155111u64)));
        }
        other => panic!("expected an EIP-1559 envelope, got {other:?}"),
    }

    // Ownership of the assembled bytes passes to the broadcaster
    let broadcaster = RecordingBroadcaster::default();
    let txid = broadcaster.broadcast(&signed).await.unwrap();
    assert_eq!(txid, "txid-1");
    assert_eq!(
        broadcaster.sent.lock().unwrap().as_slice(),
        &[signed.raw_hex()]
    );
}

#[tokio::test]
async fn test_bitcoin_legacy_transfer_round_trip() {
    init_tracing();
    let (wallet, _) = wallet_with(SignerBehavior::Normal { delay_polls: 0 }, btc_state(), fast_config());
    let request = transfer_request(
        btc_config(BtcAddressKind::Legacy),
        "bitcoin-1",
        &btc_recipient(),
        30_000,
    );

    let signed = wallet.create_transfer(&request).await.unwrap();
    assert_eq!(signed.chain, Chain::Bitcoin);

    let tx: bitcoin::Transaction = consensus::encode::deserialize(&signed.raw).unwrap();
    assert_eq!(tx.input.len(), 1);
    assert!(tx.input[0].witness.is_empty());
    assert!(!tx.input[0].script_sig.is_empty());

    // The second script_sig push is the compressed child key
    let child = derive_child_key(&root_key(), ACCOUNT, "bitcoin-1", 0).unwrap();
    assert!(tx.input[0]
        .script_sig
        .as_bytes()
        .ends_with(&child.compressed_bytes()));

    assert_eq!(tx.output[0].value, bitcoin::Amount::from_sat(30_000));
    // change: 100_000 - 30_000 - 500
    assert_eq!(tx.output[1].value, bitcoin::Amount::from_sat(69_500));
}

#[tokio::test]
async fn test_bitcoin_segwit_transfer_round_trip() {
    let (wallet, _) = wallet_with(SignerBehavior::Normal { delay_polls: 0 }, btc_state(), fast_config());
    let request = transfer_request(
        btc_config(BtcAddressKind::Segwit),
        "bitcoin-1",
        &btc_recipient(),
        30_000,
    );

    let signed = wallet.create_transfer(&request).await.unwrap();
    let tx: bitcoin::Transaction = consensus::encode::deserialize(&signed.raw).unwrap();

    assert!(tx.input[0].script_sig.is_empty());
    let witness = &tx.input[0].witness;
    assert_eq!(witness.len(), 2);

    let child = derive_child_key(&root_key(), ACCOUNT, "bitcoin-1", 0).unwrap();
    assert_eq!(witness.nth(1), Some(&child.compressed_bytes()[..]));
}

#[tokio::test]
async fn test_corrupted_signature_is_rejected_before_assembly() {
    let (wallet, _) = wallet_with(SignerBehavior::CorruptPayload, eth_state(), fast_config());
    let request = transfer_request(
        ChainConfig::Ethereum,
        "ethereum-1",
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        1_000,
    );
    let err = wallet.create_transfer(&request).await;
    assert!(matches!(err, Err(Error::InvalidSignature(_))), "got {err:?}");
}

#[tokio::test]
async fn test_timeout_surfaces_and_retry_succeeds() {
    let slow = SignerConfig {
        timeout: Duration::from_millis(30),
        poll_interval: Duration::from_millis(5),
        max_poll_interval: Duration::from_millis(10),
    };
    let (wallet, _) = wallet_with(SignerBehavior::NeverComplete, eth_state(), slow);
    let request = transfer_request(
        ChainConfig::Ethereum,
        "ethereum-1",
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        1_000,
    );
    let err = wallet.create_transfer(&request).await;
    assert!(matches!(err, Err(Error::TimedOut(_))), "got {err:?}");

    // Identical inputs derive the identical child key, so retrying against a
    // responsive signer completes the same transfer
    let (wallet, _) = wallet_with(SignerBehavior::Normal { delay_polls: 1 }, eth_state(), fast_config());
    wallet.create_transfer(&request).await.unwrap();
}

#[tokio::test]
async fn test_duplicate_submissions_both_verify_against_the_child_key() {
    let client = SigningClient::new(
        SimSigner::new(SignerBehavior::Normal { delay_polls: 0 }),
        fast_config(),
    );
    let payload = [0x42u8; 32];

    let first = client.sign(payload, "ethereum-1", 0).await.unwrap();
    let second = client.sign(payload, "ethereum-1", 0).await.unwrap();

    let child = derive_child_key(&root_key(), ACCOUNT, "ethereum-1", 0).unwrap();
    assembler::verify_signature(&payload, &first, &child).unwrap();
    assembler::verify_signature(&payload, &second, &child).unwrap();
}

#[tokio::test]
async fn test_assembly_fails_on_derivation_mismatch() {
    let state = match eth_state() {
        ChainState::Ethereum(state) => state,
        _ => unreachable!(),
    };
    let sender = derive_child_key(&root_key(), ACCOUNT, "ethereum-1", 0).unwrap();
    let sender_address = chainsig_wallet::address::ethereum::parse(
        &chainsig_wallet::address::ethereum::encode(&sender),
    )
    .unwrap();
    let unsigned = UnsignedTransaction::Ethereum(
        transaction::ethereum::build_transfer(
            sender_address,
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            U256::from(1_000),
            &state,
        )
        .unwrap(),
    );

    let stale_expectation = derive_child_key(&root_key(), ACCOUNT, "ethereum-2", 0).unwrap();
    let signature = chainsig_wallet::signer::RawSignature {
        r: [1u8; 32],
        s: [1u8; 32],
        recovery_id: 0,
    };
    let err = assembler::assemble(
        &root_key(),
        ACCOUNT,
        "ethereum-1",
        0,
        &unsigned,
        &signature,
        &stale_expectation,
    );
    assert!(matches!(err, Err(Error::DerivationMismatch { .. })), "got {err:?}");
}

#[tokio::test]
async fn test_invalid_amount_and_chain_state_mismatch() {
    let (wallet, _) = wallet_with(SignerBehavior::Normal { delay_polls: 0 }, eth_state(), fast_config());

    let zero = transfer_request(
        ChainConfig::Ethereum,
        "ethereum-1",
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        0,
    );
    assert!(matches!(
        wallet.create_transfer(&zero).await,
        Err(Error::InvalidAmount { chain: "ethereum", .. })
    ));

    // Ethereum state served for a Bitcoin transfer
    let mismatched = transfer_request(
        btc_config(BtcAddressKind::Legacy),
        "bitcoin-1",
        &btc_recipient(),
        1_000,
    );
    assert!(matches!(
        wallet.create_transfer(&mismatched).await,
        Err(Error::InsufficientChainState { chain: "bitcoin", .. })
    ));
}

#[tokio::test]
async fn test_unsupported_key_version_fails_before_signing() {
    let (wallet, _) = wallet_with(SignerBehavior::Normal { delay_polls: 0 }, eth_state(), fast_config());
    let mut request = transfer_request(
        ChainConfig::Ethereum,
        "ethereum-1",
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        1_000,
    );
    request.key_version = 2;
    assert!(matches!(
        wallet.create_transfer(&request).await,
        Err(Error::UnsupportedKeyVersion(2))
    ));
}

#[tokio::test]
async fn test_root_key_is_fetched_exactly_once() {
    let (wallet, root_keys) = wallet_with(SignerBehavior::Normal { delay_polls: 0 }, eth_state(), fast_config());

    wallet
        .derive_address(ACCOUNT, "ethereum-1", 0, &ChainConfig::Ethereum)
        .await
        .unwrap();
    wallet
        .derive_address(ACCOUNT, "ethereum-2", 0, &ChainConfig::Ethereum)
        .await
        .unwrap();
    let request = transfer_request(
        ChainConfig::Ethereum,
        "ethereum-1",
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        1_000,
    );
    wallet.create_transfer(&request).await.unwrap();

    assert_eq!(root_keys.fetches.load(Ordering::SeqCst), 1);
}
