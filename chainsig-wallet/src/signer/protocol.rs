//! Signing-service wire types
//!
//! The request and response shapes are pinned to the deployed MPC contract:
//! a request carries the 32-byte payload, the derivation path, and the key
//! version; the response carries the signature as (R, s, recovery id) with R
//! as a compressed affine point.

use serde::{Deserialize, Serialize};

use crate::crypto::curve;
use crate::error::{Error, Result};

/// A signing request, correlated with its result by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    /// The digest to sign
    pub payload: [u8; 32],
    /// Caller-chosen derivation path
    pub path: String,
    /// Root key generation; must match the version used for derivation
    pub key_version: u32,
}

/// The R component of a signature, as the signer serializes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableAffinePoint {
    /// Compressed SEC1 point, hex
    pub affine_point: String,
}

/// The s component of a signature, as the signer serializes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableScalar {
    /// 32-byte big-endian scalar, hex
    pub scalar: String,
}

/// A completed signature as returned by the signing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureResponse {
    pub big_r: SerializableAffinePoint,
    pub s: SerializableScalar,
    pub recovery_id: u8,
}

/// A validated (r, s, recovery id) triple ready for verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

impl SignatureResponse {
    /// Build a response from raw components (transport adapters and tests).
    pub fn from_raw_parts(big_r: &[u8; 33], s: &[u8; 32], recovery_id: u8) -> Self {
        Self {
            big_r: SerializableAffinePoint { affine_point: hex::encode(big_r) },
            s: SerializableScalar { scalar: hex::encode(s) },
            recovery_id,
        }
    }

    /// Validate the wire encoding and extract (r, s, recovery id).
    ///
    /// r is the x-coordinate of the returned R point. Fails with
    /// `InvalidSignature` on any malformed component.
    pub fn to_raw(&self) -> Result<RawSignature> {
        let big_r = hex::decode(&self.big_r.affine_point)
            .map_err(|_| Error::InvalidSignature("big_r is not valid hex"))?;
        if big_r.len() != 33 || (big_r[0] != 0x02 && big_r[0] != 0x03) {
            return Err(Error::InvalidSignature("big_r is not a compressed point"));
        }
        curve::parse_sec1(&big_r).ok_or(Error::InvalidSignature("big_r is not on the curve"))?;

        let s_bytes = hex::decode(&self.s.scalar)
            .map_err(|_| Error::InvalidSignature("s is not valid hex"))?;
        let s: [u8; 32] = s_bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidSignature("s is not 32 bytes"))?;

        if self.recovery_id > 3 {
            return Err(Error::InvalidSignature("recovery id out of range"));
        }

        let mut r = [0u8; 32];
        r.copy_from_slice(&big_r[1..]);

        Ok(RawSignature { r, s, recovery_id: self.recovery_id })
    }
}
