//! Per-chain address codecs
//!
//! Each codec maps a derived child public key to that chain's canonical
//! address form and validates caller-supplied recipient addresses. Encoding
//! is a pure function of the key and the chain parameters; codecs never
//! recover keys from addresses.

pub mod bitcoin;
pub mod ethereum;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::ChildPublicKey;
use crate::error::{Error, Result};

pub use self::bitcoin::{BtcAddressKind, BtcNetwork, BtcParams, BtcSpendInfo};

/// The fixed set of supported target chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    /// EVM account-based chain
    Ethereum,
    /// Bitcoin UTXO-based chain
    Bitcoin,
}

impl Chain {
    /// Stable lowercase name, used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Bitcoin => "bitcoin",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "bitcoin" | "btc" => Ok(Chain::Bitcoin),
            other => Err(Error::UnsupportedChain(other.to_string())),
        }
    }
}

/// Per-chain parameters for address encoding and transaction building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainConfig {
    Ethereum,
    Bitcoin(BtcParams),
}

impl ChainConfig {
    /// The chain this configuration targets.
    pub fn chain(&self) -> Chain {
        match self {
            ChainConfig::Ethereum => Chain::Ethereum,
            ChainConfig::Bitcoin(_) => Chain::Bitcoin,
        }
    }
}

/// Encode a derived child key as the configured chain's address string.
pub fn encode_address(child: &ChildPublicKey, config: &ChainConfig) -> Result<String> {
    match config {
        ChainConfig::Ethereum => Ok(ethereum::encode(child)),
        ChainConfig::Bitcoin(params) => bitcoin::encode(child, params),
    }
}
