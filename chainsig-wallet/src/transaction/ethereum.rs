//! Ethereum transfer builder
//!
//! Builds an EIP-1559 value transfer and computes its signing hash (keccak
//! over the typed RLP envelope, including the chain id). All sequencing and
//! fee fields come from externally-fetched [`EthChainState`].

use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Eip1559TransactionRequest, Signature as EthSignature, U256};
use serde::{Deserialize, Serialize};

use crate::address::ethereum as eth_address;
use crate::address::Chain;
use crate::crypto::kdf::ChildPublicKey;
use crate::error::{Error, Result};
use crate::signer::protocol::RawSignature;
use crate::transaction::SignedTransaction;

/// Externally-fetched Ethereum sequencing data.
///
/// Every field is required to build a transfer; an absent field fails with
/// `InsufficientChainState` naming it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EthChainState {
    /// Next account nonce
    pub nonce: Option<U256>,
    /// EIP-155 chain id
    pub chain_id: Option<u64>,
    /// EIP-1559 max fee per gas, in wei
    pub max_fee_per_gas: Option<U256>,
    /// EIP-1559 priority fee per gas, in wei
    pub max_priority_fee_per_gas: Option<U256>,
    /// Gas limit for the transfer
    pub gas_limit: Option<U256>,
}

/// Ether has no consensus supply cap; one billion ETH in wei bounds any
/// real balance.
fn max_transfer_wei() -> U256 {
    U256::exp10(27)
}

/// An unsigned EIP-1559 transfer.
#[derive(Debug, Clone)]
pub struct EthUnsignedTransfer {
    /// Sender address, derived from the child key at build time
    pub sender: Address,
    /// The transaction body
    pub tx: Eip1559TransactionRequest,
}

impl EthUnsignedTransfer {
    /// The typed-transaction signing hash.
    pub fn signing_hash(&self) -> [u8; 32] {
        TypedTransaction::Eip1559(self.tx.clone())
            .sighash()
            .to_fixed_bytes()
    }
}

/// Build an unsigned transfer of `amount_wei` from `sender` to `recipient`.
pub fn build_transfer(
    sender: Address,
    recipient: &str,
    amount_wei: U256,
    state: &EthChainState,
) -> Result<EthUnsignedTransfer> {
    if amount_wei.is_zero() {
        return Err(Error::InvalidAmount {
            chain: "ethereum",
            amount: 0,
            reason: "transfer amount must be positive",
        });
    }
    if amount_wei > max_transfer_wei() {
        let reportable = if amount_wei > U256::from(u128::MAX) {
            u128::MAX
        } else {
            amount_wei.low_u128()
        };
        return Err(Error::InvalidAmount {
            chain: "ethereum",
            amount: reportable,
            reason: "amount exceeds any plausible ether balance",
        });
    }

    let to = eth_address::parse(recipient)?;

    let missing = |field: &str| Error::InsufficientChainState {
        chain: "ethereum",
        missing: field.to_string(),
    };
    let nonce = state.nonce.ok_or_else(|| missing("nonce"))?;
    let chain_id = state.chain_id.ok_or_else(|| missing("chain_id"))?;
    let max_fee = state.max_fee_per_gas.ok_or_else(|| missing("max_fee_per_gas"))?;
    let priority_fee = state
        .max_priority_fee_per_gas
        .ok_or_else(|| missing("max_priority_fee_per_gas"))?;
    let gas_limit = state.gas_limit.ok_or_else(|| missing("gas_limit"))?;

    let tx = Eip1559TransactionRequest::new()
        .to(to)
        .value(amount_wei)
        .nonce(nonce)
        .gas(gas_limit)
        .max_fee_per_gas(max_fee)
        .max_priority_fee_per_gas(priority_fee)
        .chain_id(chain_id);

    Ok(EthUnsignedTransfer { sender, tx })
}

/// Attach a verified signature, producing the broadcast-ready RLP envelope.
///
/// The signer recovered from the signature must equal both the sender the
/// transfer was built for and the address of the derived child key; either
/// mismatch means the signature belongs to a different key.
pub fn finalize(
    unsigned: &EthUnsignedTransfer,
    signature: &RawSignature,
    child: &ChildPublicKey,
) -> Result<SignedTransaction> {
    let tx = TypedTransaction::Eip1559(unsigned.tx.clone());
    let sighash = tx.sighash();

    let sig = EthSignature {
        r: U256::from_big_endian(&signature.r),
        s: U256::from_big_endian(&signature.s),
        v: signature.recovery_id as u64,
    };

    let recovered = sig
        .recover(sighash)
        .map_err(|_| Error::InvalidSignature("public key recovery failed"))?;
    let child_address = Address::from_slice(&eth_address::address_bytes(child));
    if recovered != unsigned.sender || recovered != child_address {
        return Err(Error::InvalidSignature(
            "recovered signer does not match the derived sender address",
        ));
    }

    Ok(SignedTransaction {
        chain: Chain::Ethereum,
        raw: tx.rlp_signed(&sig).to_vec(),
    })
}
