//! Wallet facade
//!
//! Ties derivation, codecs, builders, the signing client, and the assembler
//! together behind two operations: `derive_address` and `create_transfer`.
//! All I/O happens through caller-supplied collaborators; the only shared
//! state is the root public key, fetched at most once and immutable after.

use async_trait::async_trait;
use ethers_core::types::U256;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::address::{self, BtcSpendInfo, Chain, ChainConfig};
use crate::assembler;
use crate::crypto::kdf::{derive_child_key, ChildPublicKey, RootPublicKey};
use crate::error::{Error, Result};
use crate::signer::{SignerTransport, SigningClient};
use crate::transaction::{self, ChainState, SignedTransaction, UnsignedTransaction};

/// Source of the MPC service's root public key. One-shot; the wallet caches
/// the result for the process lifetime.
#[async_trait]
pub trait RootKeyProvider: Send + Sync {
    async fn fetch_root_public_key(&self) -> Result<RootPublicKey>;
}

#[async_trait]
impl<T: RootKeyProvider + ?Sized> RootKeyProvider for std::sync::Arc<T> {
    async fn fetch_root_public_key(&self) -> Result<RootPublicKey> {
        (**self).fetch_root_public_key().await
    }
}

/// Source of per-transfer chain sequencing data (nonce, fees, UTXOs).
/// Fetched fresh for every build; never cached by the wallet.
#[async_trait]
pub trait ChainStateProvider: Send + Sync {
    async fn fetch_chain_state(&self, chain: Chain, address: &str) -> Result<ChainState>;
}

/// Consumer of the wallet's output. Implemented elsewhere; the wallet never
/// broadcasts itself.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Broadcast a signed transaction, returning the chain's transaction id.
    async fn broadcast(&self, tx: &SignedTransaction) -> Result<String>;
}

/// A derived address together with its child public key.
#[derive(Debug, Clone)]
pub struct DerivedAddress {
    pub chain: Chain,
    pub address: String,
    pub public_key: ChildPublicKey,
}

/// Everything needed to build, sign, and assemble one transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Account whose derived key spends the funds
    pub account_id: String,
    /// Caller-chosen derivation path scoping the sub-wallet
    pub path: String,
    /// Root key generation
    pub key_version: u32,
    /// Target chain and its parameters
    pub chain: ChainConfig,
    /// Recipient address in the target chain's format
    pub recipient: String,
    /// Amount in base units (wei, satoshis)
    pub amount: u128,
}

/// Multi-chain MPC wallet.
pub struct Wallet<K, S, T> {
    root_keys: K,
    chain_state: S,
    signing: SigningClient<T>,
    root: OnceCell<RootPublicKey>,
}

impl<K, S, T> Wallet<K, S, T>
where
    K: RootKeyProvider,
    S: ChainStateProvider,
    T: SignerTransport,
{
    pub fn new(root_keys: K, chain_state: S, signing: SigningClient<T>) -> Self {
        Self {
            root_keys,
            chain_state,
            signing,
            root: OnceCell::new(),
        }
    }

    /// The cached root public key, fetched on first use.
    ///
    /// Initialization runs at most once even when several callers race the
    /// first fetch; afterwards the key is shared read-only.
    pub async fn root_public_key(&self) -> Result<&RootPublicKey> {
        self.root
            .get_or_try_init(|| async {
                let key = self.root_keys.fetch_root_public_key().await?;
                debug!(root_key = %key, "root public key fetched");
                Ok(key)
            })
            .await
    }

    /// Derive the address of (account, path, key_version) on the configured
    /// chain.
    pub async fn derive_address(
        &self,
        account_id: &str,
        path: &str,
        key_version: u32,
        config: &ChainConfig,
    ) -> Result<DerivedAddress> {
        let root = self.root_public_key().await?;
        let public_key = derive_child_key(root, account_id, path, key_version)?;
        let address = address::encode_address(&public_key, config)?;
        debug!(chain = %config.chain(), account_id, path, %address, "derived address");
        Ok(DerivedAddress {
            chain: config.chain(),
            address,
            public_key,
        })
    }

    /// Build, sign, verify, and assemble one transfer.
    ///
    /// Suspends while the signing service completes its rounds; concurrent
    /// transfers for other (account, path, chain) triples proceed
    /// independently. The result is handed to an external [`Broadcaster`].
    pub async fn create_transfer(&self, request: &TransferRequest) -> Result<SignedTransaction> {
        let root = self.root_public_key().await?;
        let child =
            derive_child_key(root, &request.account_id, &request.path, request.key_version)?;

        let chain = request.chain.chain();
        let sender = address::encode_address(&child, &request.chain)?;
        let state = self.chain_state.fetch_chain_state(chain, &sender).await?;

        let unsigned = build_unsigned(&child, &sender, request, &state)?;
        let signing_hash = unsigned.signing_hash()?;

        info!(%chain, sender = %sender, recipient = %request.recipient, amount = request.amount, "transfer built, requesting signature");
        let handle = self
            .signing
            .request_signature(signing_hash, &request.path, request.key_version)
            .await?;
        let signature = self.signing.await_result(&handle).await?;

        assembler::assemble(
            root,
            &request.account_id,
            &request.path,
            request.key_version,
            &unsigned,
            &signature,
            &child,
        )
    }
}

/// Dispatch to the chain-specific builder, checking that the fetched state
/// matches the configured chain.
fn build_unsigned(
    child: &ChildPublicKey,
    sender: &str,
    request: &TransferRequest,
    state: &ChainState,
) -> Result<UnsignedTransaction> {
    match (&request.chain, state) {
        (ChainConfig::Ethereum, ChainState::Ethereum(eth_state)) => {
            let sender = crate::address::ethereum::parse(sender)?;
            let tx = transaction::ethereum::build_transfer(
                sender,
                &request.recipient,
                U256::from(request.amount),
                eth_state,
            )?;
            Ok(UnsignedTransaction::Ethereum(tx))
        }
        (ChainConfig::Bitcoin(params), ChainState::Bitcoin(btc_state)) => {
            let amount = u64::try_from(request.amount).map_err(|_| Error::InvalidAmount {
                chain: "bitcoin",
                amount: request.amount,
                reason: "amount does not fit in 64 bits",
            })?;
            let spend = BtcSpendInfo::from_child_key(child, params);
            let tx = transaction::bitcoin::build_transfer(
                &spend,
                &request.recipient,
                amount,
                btc_state,
            )?;
            Ok(UnsignedTransaction::Bitcoin(tx))
        }
        (config, _) => Err(Error::InsufficientChainState {
            chain: config.chain().name(),
            missing: format!("chain state for {}", config.chain()),
        }),
    }
}
