//! Additive key derivation shared with the MPC signing service
//!
//! A child public key is `root + epsilon * G`, where `epsilon` is a scalar
//! hashed from the account identifier and a caller-chosen path. The signer
//! applies the same tweak to its secret share, so a signature it produces for
//! a given (account, path) verifies against the child key derived here. The
//! domain tag and reduction rule are pinned to the deployed signer contract;
//! changing either silently produces addresses the signer cannot sign for.

use std::fmt;
use std::str::FromStr;

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::ecdsa::VerifyingKey;
use k256::{AffinePoint, PublicKey, Scalar};
use sha3::{Digest, Sha3_256};

use crate::crypto::curve;
use crate::error::{Error, Result};

/// Domain-separation tag for key version 0 epsilon derivation.
///
/// Must match the tag used by the signing service byte for byte.
pub const EPSILON_DERIVATION_PREFIX: &str = "near-mpc-recovery v0.1.0 epsilon derivation:";

/// Curve-name prefix of the serialized root key form.
const ROOT_KEY_PREFIX: &str = "secp256k1";

/// The MPC service's long-lived root public key.
///
/// Serialized as `"secp256k1:" + base58(x || y)` with 64 coordinate bytes.
/// Fetched once from the signer and treated as immutable for the process
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPublicKey {
    key: PublicKey,
}

impl RootPublicKey {
    /// Wrap an already-validated public key.
    pub fn new(key: PublicKey) -> Self {
        Self { key }
    }

    /// Parse the signer's serialized root key form.
    pub fn parse(s: &str) -> Result<Self> {
        let (prefix, data) = s
            .split_once(':')
            .ok_or_else(|| Error::MalformedRootKey(format!("missing ':' separator in {s:?}")))?;

        if prefix != ROOT_KEY_PREFIX {
            return Err(Error::MalformedRootKey(format!(
                "unexpected curve prefix {prefix:?}, want {ROOT_KEY_PREFIX:?}"
            )));
        }

        let bytes = bs58::decode(data)
            .into_vec()
            .map_err(|e| Error::MalformedRootKey(format!("invalid base58 encoding: {e}")))?;

        let coords: [u8; 64] = bytes.as_slice().try_into().map_err(|_| {
            Error::MalformedRootKey(format!("expected 64 coordinate bytes, got {}", bytes.len()))
        })?;

        let key = curve::parse_uncompressed(&coords)
            .ok_or_else(|| Error::MalformedRootKey("point is not on the curve".to_string()))?;

        Ok(Self { key })
    }

    /// The root key as a curve point.
    pub fn point(&self) -> AffinePoint {
        *self.key.as_affine()
    }

    /// The 64 coordinate bytes `x || y`.
    pub fn coordinates(&self) -> [u8; 64] {
        let encoded = self.key.to_encoded_point(false);
        let mut out = [0u8; 64];
        out.copy_from_slice(&encoded.as_bytes()[1..]);
        out
    }
}

impl FromStr for RootPublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for RootPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = bs58::encode(self.coordinates()).into_string();
        write!(f, "{ROOT_KEY_PREFIX}:{encoded}")
    }
}

/// A derived, non-secret child public key.
///
/// Never the point at infinity; recomputed on demand and safe to log or
/// persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildPublicKey {
    key: PublicKey,
}

impl ChildPublicKey {
    /// The 64 coordinate bytes `x || y` (no SEC1 prefix).
    pub fn coordinates(&self) -> [u8; 64] {
        let encoded = self.key.to_encoded_point(false);
        let mut out = [0u8; 64];
        out.copy_from_slice(&encoded.as_bytes()[1..]);
        out
    }

    /// SEC1 uncompressed encoding (65 bytes, `04` prefix).
    pub fn uncompressed_bytes(&self) -> [u8; 65] {
        let encoded = self.key.to_encoded_point(false);
        let mut out = [0u8; 65];
        out.copy_from_slice(encoded.as_bytes());
        out
    }

    /// SEC1 compressed encoding (33 bytes).
    pub fn compressed_bytes(&self) -> [u8; 33] {
        let encoded = self.key.to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(encoded.as_bytes());
        out
    }

    /// Hex form of the uncompressed encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.uncompressed_bytes())
    }

    /// The key as an ECDSA verifier.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from(&self.key)
    }
}

/// Compute the derivation scalar for (account, path) under a key version.
///
/// `epsilon = reduce(SHA3-256(tag || account_id || "," || path))` where the
/// tag is selected by `key_version`. Only version 0 is defined by the signer
/// today; unknown versions fail rather than deriving an unusable key.
pub fn derive_epsilon(account_id: &str, path: &str, key_version: u32) -> Result<Scalar> {
    if key_version != 0 {
        return Err(Error::UnsupportedKeyVersion(key_version));
    }

    let mut hasher = Sha3_256::new();
    hasher.update(EPSILON_DERIVATION_PREFIX.as_bytes());
    hasher.update(account_id.as_bytes());
    hasher.update(b",");
    hasher.update(path.as_bytes());

    Ok(curve::scalar_from_digest(hasher.finalize().into()))
}

/// Derive the child public key for (account, path, key version).
///
/// Deterministic: the same inputs always yield the same key. An epsilon of
/// zero is permitted (the child equals the root); a point-at-infinity result
/// fails with [`Error::DegenerateKey`].
pub fn derive_child_key(
    root: &RootPublicKey,
    account_id: &str,
    path: &str,
    key_version: u32,
) -> Result<ChildPublicKey> {
    let epsilon = derive_epsilon(account_id, path, key_version)?;
    let child = curve::tweak_point(&root.point(), &epsilon);

    let key = PublicKey::from_affine(child.to_affine()).map_err(|_| Error::DegenerateKey {
        account_id: account_id.to_string(),
        path: path.to_string(),
    })?;

    Ok(ChildPublicKey { key })
}
