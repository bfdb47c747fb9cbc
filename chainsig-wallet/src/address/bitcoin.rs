//! Bitcoin address codec
//!
//! address = hash160 (SHA-256 then RIPEMD-160) of the compressed public key,
//! wrapped either as a version-byte-prefixed base58check string (legacy
//! P2PKH) or as a bech32 segwit v0 string (P2WPKH). Mainnet/testnet prefixes
//! come from [`BtcParams`], never hard-coded call sites.

use bitcoin::hashes::{hash160, sha256d, Hash};
use bitcoin::{Network, PubkeyHash, ScriptBuf, WPubkeyHash};
use serde::{Deserialize, Serialize};

use crate::crypto::kdf::ChildPublicKey;
use crate::error::{Error, Result};

/// Bitcoin network selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BtcNetwork {
    Mainnet,
    Testnet,
}

impl BtcNetwork {
    /// The `bitcoin` crate's network value.
    pub fn to_network(self) -> Network {
        match self {
            BtcNetwork::Mainnet => Network::Bitcoin,
            BtcNetwork::Testnet => Network::Testnet,
        }
    }

    /// Version byte for legacy P2PKH addresses.
    fn p2pkh_version(self) -> u8 {
        match self {
            BtcNetwork::Mainnet => 0x00,
            BtcNetwork::Testnet => 0x6f,
        }
    }

    /// Human-readable part for segwit addresses.
    fn hrp(self) -> bech32::Hrp {
        match self {
            BtcNetwork::Mainnet => bech32::hrp::BC,
            BtcNetwork::Testnet => bech32::hrp::TB,
        }
    }
}

/// Which output script a derived key spends to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BtcAddressKind {
    /// Base58check P2PKH
    Legacy,
    /// Bech32 segwit v0 P2WPKH
    Segwit,
}

/// Bitcoin chain parameters, supplied by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcParams {
    pub network: BtcNetwork,
    pub kind: BtcAddressKind,
}

/// Everything the transaction builder needs to spend from a derived key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtcSpendInfo {
    /// Compressed public key (33 bytes)
    pub public_key: [u8; 33],
    /// hash160 of the compressed public key
    pub pubkey_hash: [u8; 20],
    pub kind: BtcAddressKind,
    pub network: BtcNetwork,
}

impl BtcSpendInfo {
    /// Compute spend info for a derived child key under the given parameters.
    pub fn from_child_key(child: &ChildPublicKey, params: &BtcParams) -> Self {
        let public_key = child.compressed_bytes();
        let pubkey_hash = hash160::Hash::hash(&public_key).to_byte_array();
        Self {
            public_key,
            pubkey_hash,
            kind: params.kind,
            network: params.network,
        }
    }

    /// The output script a derived address locks funds to.
    pub fn script_pubkey(&self) -> ScriptBuf {
        match self.kind {
            BtcAddressKind::Legacy => ScriptBuf::new_p2pkh(&PubkeyHash::from_raw_hash(
                hash160::Hash::from_byte_array(self.pubkey_hash),
            )),
            BtcAddressKind::Segwit => ScriptBuf::new_p2wpkh(&WPubkeyHash::from_raw_hash(
                hash160::Hash::from_byte_array(self.pubkey_hash),
            )),
        }
    }

    /// The address string for this spend info.
    pub fn address(&self) -> Result<String> {
        match self.kind {
            BtcAddressKind::Legacy => Ok(base58check(
                self.network.p2pkh_version(),
                &self.pubkey_hash,
            )),
            BtcAddressKind::Segwit => {
                bech32::segwit::encode(self.network.hrp(), bech32::Fe32::Q, &self.pubkey_hash)
                    .map_err(|e| Error::Encoding(format!("bech32 encoding failed: {e}")))
            }
        }
    }
}

/// Encode a derived child key as a Bitcoin address string.
pub fn encode(child: &ChildPublicKey, params: &BtcParams) -> Result<String> {
    BtcSpendInfo::from_child_key(child, params).address()
}

/// Validate a caller-supplied recipient address and return its output script.
///
/// Network is enforced: a mainnet address is rejected under a testnet
/// configuration and vice versa.
pub fn parse(text: &str, network: BtcNetwork) -> Result<ScriptBuf> {
    let invalid = |reason: String| Error::InvalidAddressFormat {
        chain: "bitcoin",
        address: text.to_string(),
        reason,
    };

    let unchecked: bitcoin::Address<bitcoin::address::NetworkUnchecked> = text
        .parse()
        .map_err(|e| invalid(format!("unparseable address: {e}")))?;

    let address = unchecked
        .require_network(network.to_network())
        .map_err(|e| invalid(format!("wrong network: {e}")))?;

    Ok(address.script_pubkey())
}

/// version byte + payload + first four bytes of double-SHA-256, in base58.
fn base58check(version: u8, payload: &[u8; 20]) -> String {
    let mut data = Vec::with_capacity(25);
    data.push(version);
    data.extend_from_slice(payload);

    let checksum = sha256d::Hash::hash(&data).to_byte_array();
    data.extend_from_slice(&checksum[..4]);

    bs58::encode(data).into_string()
}
