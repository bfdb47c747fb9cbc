//! secp256k1 scalar and point helpers
//!
//! Small pure wrappers over `k256` used by the key-derivation function and
//! the signing-protocol codecs. Everything here is deterministic and free of
//! shared state.

use k256::elliptic_curve::generic_array::GenericArray;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::FromEncodedPoint;
use k256::{AffinePoint, EncodedPoint, ProjectivePoint, PublicKey, Scalar, U256};

/// Map a 32-byte digest to a scalar by interpreting it as a big-endian
/// integer and reducing modulo the group order.
///
/// This is the reduction rule the MPC signer applies to the epsilon digest;
/// both sides must use it bit-exactly or derived addresses diverge.
pub fn scalar_from_digest(digest: [u8; 32]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce(U256::from_be_slice(&digest))
}

/// Compute `parent + tweak * G` in projective coordinates.
///
/// The result may be the identity when `parent == -tweak * G`; callers must
/// check before treating it as a usable public key.
pub fn tweak_point(parent: &AffinePoint, tweak: &Scalar) -> ProjectivePoint {
    ProjectivePoint::from(*parent) + ProjectivePoint::GENERATOR * tweak
}

/// Parse a 64-byte `x || y` coordinate pair into a validated public key.
///
/// Returns `None` when the coordinates are not a point on the curve.
pub fn parse_uncompressed(bytes: &[u8; 64]) -> Option<PublicKey> {
    let encoded = EncodedPoint::from_untagged_bytes(GenericArray::from_slice(bytes));
    Option::from(PublicKey::from_encoded_point(&encoded))
}

/// Parse a SEC1-encoded point (compressed or uncompressed, with prefix byte).
pub fn parse_sec1(bytes: &[u8]) -> Option<PublicKey> {
    PublicKey::from_sec1_bytes(bytes).ok()
}
