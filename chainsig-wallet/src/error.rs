//! Error types for the chainsig-wallet library

use std::time::Duration;

use thiserror::Error;

/// Custom error type for chainsig-wallet operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed root public key: {0}")]
    MalformedRootKey(String),

    #[error("derived key for account {account_id:?}, path {path:?} is the point at infinity")]
    DegenerateKey { account_id: String, path: String },

    #[error("unsupported key version: {0}")]
    UnsupportedKeyVersion(u32),

    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("invalid {chain} address {address:?}: {reason}")]
    InvalidAddressFormat {
        chain: &'static str,
        address: String,
        reason: String,
    },

    #[error("missing chain state for {chain}: {missing}")]
    InsufficientChainState {
        chain: &'static str,
        missing: String,
    },

    #[error("invalid amount {amount} for {chain}: {reason}")]
    InvalidAmount {
        chain: &'static str,
        amount: u128,
        reason: &'static str,
    },

    #[error("signing request timed out after {0:?}")]
    TimedOut(Duration),

    #[error("signing request rejected by signer: {0}")]
    Rejected(String),

    #[error("signer transport error: {0}")]
    Transport(String),

    #[error("derived child key for account {account_id:?}, path {path:?} does not match the expected key")]
    DerivationMismatch { account_id: String, path: String },

    #[error("signature failed verification: {0}")]
    InvalidSignature(&'static str),

    #[error("broadcast failed on {chain}: {reason}")]
    Broadcast { chain: &'static str, reason: String },

    #[error("transaction encoding error: {0}")]
    Encoding(String),
}

/// Result type for chainsig-wallet operations
pub type Result<T> = std::result::Result<T, Error>;
