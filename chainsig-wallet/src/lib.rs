//! Chainsig Wallet Core - MPC chain-signatures SDK
//!
//! This library lets an account control addresses on foreign chains through a
//! threshold MPC signing service: a single root public key is combined with an
//! account identifier and a caller-chosen derivation path to produce
//! independent child keys, one per (account, path, chain) triple. The library
//! covers deterministic key derivation, per-chain address encoding,
//! unsigned-transaction construction, the asynchronous signing-request
//! protocol, and verified signature assembly. Broadcasting and RPC plumbing
//! live behind collaborator traits supplied by the caller.

pub mod error;
pub mod crypto;
pub mod address;
pub mod transaction;
pub mod signer;
pub mod assembler;
pub mod wallet;

// Re-export commonly used types for convenience
pub use error::{Error, Result};
pub use crypto::kdf::{derive_child_key, derive_epsilon, ChildPublicKey, RootPublicKey};
pub use wallet::{DerivedAddress, TransferRequest, Wallet};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
