//! Cryptographic primitives and key derivation
//!
//! This module provides the secp256k1 scalar/point helpers and the additive
//! key-derivation scheme shared with the MPC signing service.

pub mod curve;
pub mod kdf;

pub use kdf::*;
