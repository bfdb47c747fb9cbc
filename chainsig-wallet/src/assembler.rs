//! Transaction assembler
//!
//! Combines a signer-returned signature with the unsigned transaction it was
//! requested for, producing a broadcast-ready transaction. Verification is
//! never skipped: the child key is re-derived from the same inputs used at
//! build time and the signature is checked against the recomputed signing
//! hash before anything is attached. This is the sole defense against a
//! corrupted transport or a signer bug silently producing a signature for
//! the wrong key.

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use tracing::info;

use crate::crypto::kdf::{derive_child_key, ChildPublicKey, RootPublicKey};
use crate::error::{Error, Result};
use crate::signer::protocol::RawSignature;
use crate::transaction::{bitcoin, ethereum, SignedTransaction, UnsignedTransaction};

/// Verify a raw signature against a signing hash and a derived child key.
///
/// Normalizes to the low-s form (flipping the recovery id when s flips) and
/// additionally requires that public-key recovery with the attached recovery
/// id lands on the child key. Returns the normalized signature for chain
/// encoding.
pub fn verify_signature(
    signing_hash: &[u8; 32],
    signature: &RawSignature,
    child_key: &ChildPublicKey,
) -> Result<RawSignature> {
    let sig = Signature::from_scalars(signature.r, signature.s)
        .map_err(|_| Error::InvalidSignature("r or s is not a valid scalar"))?;

    let (sig, recovery_id) = match sig.normalize_s() {
        Some(low_s) => (low_s, signature.recovery_id ^ 1),
        None => (sig, signature.recovery_id),
    };

    let verifying_key = child_key.verifying_key();
    verifying_key
        .verify_prehash(signing_hash, &sig)
        .map_err(|_| Error::InvalidSignature("signature does not verify against the child key"))?;

    let recid = RecoveryId::from_byte(recovery_id)
        .ok_or(Error::InvalidSignature("recovery id out of range"))?;
    let recovered = VerifyingKey::recover_from_prehash(signing_hash, &sig, recid)
        .map_err(|_| Error::InvalidSignature("public key recovery failed"))?;
    if recovered != verifying_key {
        return Err(Error::InvalidSignature(
            "recovery id does not recover the child key",
        ));
    }

    let bytes = sig.to_bytes();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..]);

    Ok(RawSignature { r, s, recovery_id })
}

/// Verify and attach a signature, producing a broadcast-ready transaction.
///
/// Re-derives the child key from (root, account, path, key_version) exactly
/// as at build time; a mismatch with the caller's expectation fails with
/// `DerivationMismatch` before any signature work happens.
pub fn assemble(
    root: &RootPublicKey,
    account_id: &str,
    path: &str,
    key_version: u32,
    unsigned: &UnsignedTransaction,
    signature: &RawSignature,
    expected_child_key: &ChildPublicKey,
) -> Result<SignedTransaction> {
    let derived = derive_child_key(root, account_id, path, key_version)?;
    if &derived != expected_child_key {
        return Err(Error::DerivationMismatch {
            account_id: account_id.to_string(),
            path: path.to_string(),
        });
    }

    let signing_hash = unsigned.signing_hash()?;
    let normalized = verify_signature(&signing_hash, signature, &derived)?;

    let signed = match unsigned {
        UnsignedTransaction::Ethereum(tx) => ethereum::finalize(tx, &normalized, &derived)?,
        UnsignedTransaction::Bitcoin(tx) => bitcoin::finalize(tx, &normalized, &derived)?,
    };

    info!(
        chain = %signed.chain,
        account_id,
        path,
        bytes = signed.raw.len(),
        "transfer assembled"
    );
    Ok(signed)
}
