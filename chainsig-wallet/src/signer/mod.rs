//! MPC signing-service boundary
//!
//! Wire types for the signer's request/response contract and an asynchronous
//! client that submits requests and polls for their eventual completion.

pub mod client;
pub mod protocol;

pub use client::{RequestId, SignStatus, SignerConfig, SignerTransport, SigningClient, SigningRequestHandle};
pub use protocol::{RawSignature, SignRequest, SignatureResponse};
