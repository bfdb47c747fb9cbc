//! Unsigned-transaction builders and shared transaction types
//!
//! One builder per supported chain. Builders are handed externally-fetched
//! chain state (nonce, fee parameters, UTXOs); they never fetch it
//! themselves. An unsigned transaction recomputes its signing hash on demand
//! as a pure function of its fields, so the assembler always verifies the
//! exact bytes it will broadcast.

pub mod bitcoin;
pub mod ethereum;

use serde::{Deserialize, Serialize};

use crate::address::Chain;
use crate::error::Result;

pub use self::bitcoin::{BtcChainState, BtcUnsignedTransfer, Utxo};
pub use self::ethereum::{EthChainState, EthUnsignedTransfer};

/// Chain-specific sequencing and fee data, fetched fresh per transfer by an
/// external [`crate::wallet::ChainStateProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChainState {
    Ethereum(EthChainState),
    Bitcoin(BtcChainState),
}

/// A chain-specific transaction awaiting a signature.
#[derive(Debug, Clone)]
pub enum UnsignedTransaction {
    Ethereum(EthUnsignedTransfer),
    Bitcoin(BtcUnsignedTransfer),
}

impl UnsignedTransaction {
    /// The chain this transaction targets.
    pub fn chain(&self) -> Chain {
        match self {
            UnsignedTransaction::Ethereum(_) => Chain::Ethereum,
            UnsignedTransaction::Bitcoin(_) => Chain::Bitcoin,
        }
    }

    /// The 32-byte digest the signer must sign, recomputed from the current
    /// field values.
    pub fn signing_hash(&self) -> Result<[u8; 32]> {
        match self {
            UnsignedTransaction::Ethereum(tx) => Ok(tx.signing_hash()),
            UnsignedTransaction::Bitcoin(tx) => tx.signing_hash(),
        }
    }
}

/// A broadcast-ready transaction. Terminal artifact of this library;
/// ownership passes to an external broadcaster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Target chain
    pub chain: Chain,
    /// Consensus-encoded transaction bytes
    pub raw: Vec<u8>,
}

impl SignedTransaction {
    /// Hex form of the raw bytes, as broadcast endpoints usually expect.
    pub fn raw_hex(&self) -> String {
        hex::encode(&self.raw)
    }
}
