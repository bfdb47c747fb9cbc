//! Bitcoin transfer builder
//!
//! Builds a version-2 single-input transfer spending one UTXO owned by the
//! derived address, with a recipient output and change back to the sender.
//! The signing hash follows the sender's script kind: legacy sighash for
//! P2PKH, BIP-143 for P2WPKH, both SIGHASH_ALL.

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use serde::{Deserialize, Serialize};

use crate::address::bitcoin as btc_address;
use crate::address::{BtcAddressKind, BtcSpendInfo, Chain};
use crate::crypto::kdf::ChildPublicKey;
use crate::error::{Error, Result};
use crate::signer::protocol::RawSignature;
use crate::transaction::SignedTransaction;

/// 21 million BTC in satoshis.
const MAX_MONEY_SAT: u64 = 21_000_000 * 100_000_000;

/// Outputs below this are uneconomical; change under it is folded into fees.
const DUST_LIMIT_SAT: u64 = 546;

/// One spendable output of the sender's derived address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utxo {
    /// Funding transaction id, hex
    pub txid: String,
    /// Output index within the funding transaction
    pub vout: u32,
    /// Output value in satoshis
    pub value_sat: u64,
}

/// Externally-fetched Bitcoin sequencing data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BtcChainState {
    /// Spendable outputs of the sender address
    pub utxos: Vec<Utxo>,
    /// Flat fee in satoshis, chosen by an external fee oracle
    pub fee_sat: Option<u64>,
}

/// An unsigned single-input Bitcoin transfer.
#[derive(Debug, Clone)]
pub struct BtcUnsignedTransfer {
    /// Sender spend info, derived from the child key at build time
    pub spend: BtcSpendInfo,
    /// The transaction body with an empty script_sig/witness
    pub tx: Transaction,
    /// Value of the spent output, needed for the BIP-143 sighash
    pub input_value: u64,
}

impl BtcUnsignedTransfer {
    /// The sighash the signer must sign for input 0.
    pub fn signing_hash(&self) -> Result<[u8; 32]> {
        let script_pubkey = self.spend.script_pubkey();
        let mut cache = SighashCache::new(&self.tx);

        match self.spend.kind {
            BtcAddressKind::Legacy => cache
                .legacy_signature_hash(0, &script_pubkey, EcdsaSighashType::All.to_u32())
                .map(|h| h.to_byte_array())
                .map_err(|e| Error::Encoding(format!("legacy sighash failed: {e}"))),
            BtcAddressKind::Segwit => cache
                .p2wpkh_signature_hash(
                    0,
                    &script_pubkey,
                    Amount::from_sat(self.input_value),
                    EcdsaSighashType::All,
                )
                .map(|h| h.to_byte_array())
                .map_err(|e| Error::Encoding(format!("segwit sighash failed: {e}"))),
        }
    }
}

/// Build an unsigned transfer of `amount_sat` from the sender's derived
/// address to `recipient`.
pub fn build_transfer(
    sender: &BtcSpendInfo,
    recipient: &str,
    amount_sat: u64,
    state: &BtcChainState,
) -> Result<BtcUnsignedTransfer> {
    if amount_sat == 0 {
        return Err(Error::InvalidAmount {
            chain: "bitcoin",
            amount: 0,
            reason: "transfer amount must be positive",
        });
    }
    if amount_sat > MAX_MONEY_SAT {
        return Err(Error::InvalidAmount {
            chain: "bitcoin",
            amount: amount_sat as u128,
            reason: "amount exceeds total bitcoin supply",
        });
    }

    let missing = |field: &str| Error::InsufficientChainState {
        chain: "bitcoin",
        missing: field.to_string(),
    };
    let fee_sat = state.fee_sat.ok_or_else(|| missing("fee_sat"))?;
    if state.utxos.is_empty() {
        return Err(missing("utxos"));
    }

    let recipient_script = btc_address::parse(recipient, sender.network)?;

    let target = amount_sat
        .checked_add(fee_sat)
        .ok_or_else(|| Error::InvalidAmount {
            chain: "bitcoin",
            amount: amount_sat as u128,
            reason: "amount plus fee overflows",
        })?;

    // Smallest single output that covers amount + fee
    let utxo = state
        .utxos
        .iter()
        .filter(|u| u.value_sat >= target)
        .min_by_key(|u| u.value_sat)
        .ok_or_else(|| missing("no single spendable output covers amount plus fee"))?;

    let txid: Txid = utxo
        .txid
        .parse()
        .map_err(|e| Error::Encoding(format!("invalid utxo txid {:?}: {e}", utxo.txid)))?;

    let input = TxIn {
        previous_output: OutPoint { txid, vout: utxo.vout },
        script_sig: ScriptBuf::new(),
        sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
        witness: Witness::default(),
    };

    let mut output = vec![TxOut {
        value: Amount::from_sat(amount_sat),
        script_pubkey: recipient_script,
    }];

    let change = utxo.value_sat - target;
    if change >= DUST_LIMIT_SAT {
        output.push(TxOut {
            value: Amount::from_sat(change),
            script_pubkey: sender.script_pubkey(),
        });
    }

    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![input],
        output,
    };

    Ok(BtcUnsignedTransfer {
        spend: sender.clone(),
        tx,
        input_value: utxo.value_sat,
    })
}

/// Attach a verified signature, producing consensus-encoded transaction
/// bytes.
///
/// The signature is DER-encoded with the SIGHASH_ALL byte appended and
/// placed with the compressed child key in the script_sig (legacy) or
/// witness (segwit) of input 0.
pub fn finalize(
    unsigned: &BtcUnsignedTransfer,
    signature: &RawSignature,
    child: &ChildPublicKey,
) -> Result<SignedTransaction> {
    let pubkey = child.compressed_bytes();
    if pubkey != unsigned.spend.public_key {
        return Err(Error::InvalidSignature(
            "child key does not own the spent output",
        ));
    }

    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(&signature.r);
    compact[32..].copy_from_slice(&signature.s);
    let der = secp256k1::ecdsa::Signature::from_compact(&compact)
        .map_err(|_| Error::InvalidSignature("r or s is not a valid scalar"))?
        .serialize_der();

    let mut sig_bytes = der.to_vec();
    sig_bytes.push(EcdsaSighashType::All.to_u32() as u8);

    let mut tx = unsigned.tx.clone();
    match unsigned.spend.kind {
        BtcAddressKind::Legacy => {
            let sig_push = PushBytesBuf::try_from(sig_bytes)
                .map_err(|_| Error::Encoding("signature too long for script push".to_string()))?;
            let key_push = PushBytesBuf::try_from(pubkey.to_vec())
                .map_err(|_| Error::Encoding("public key too long for script push".to_string()))?;
            tx.input[0].script_sig = Builder::new()
                .push_slice(sig_push)
                .push_slice(key_push)
                .into_script();
        }
        BtcAddressKind::Segwit => {
            let mut witness = Witness::new();
            witness.push(&sig_bytes);
            witness.push(pubkey);
            tx.input[0].witness = witness;
        }
    }

    Ok(SignedTransaction {
        chain: Chain::Bitcoin,
        raw: bitcoin::consensus::encode::serialize(&tx),
    })
}
