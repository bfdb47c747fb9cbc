//! Asynchronous signing client
//!
//! The signing service runs a multi-round protocol and may take seconds to
//! tens of seconds to produce a result. The client submits a request through
//! a [`SignerTransport`], then polls cooperatively with doubling backoff
//! under a configured timeout; the surrounding task suspends rather than
//! blocking, so unrelated requests proceed independently.
//!
//! Submitting the same (payload, path, key_version) twice is safe: identical
//! derivation inputs always yield signatures verifiable against the same
//! child key, whatever internal session identifiers the signer assigns.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::signer::protocol::{RawSignature, SignRequest, SignatureResponse};

/// Transport-assigned identifier correlating a request with its result.
pub type RequestId = String;

/// Progress of a submitted request, as reported by the transport.
#[derive(Debug, Clone)]
pub enum SignStatus {
    /// The signer has not finished yet
    Pending,
    /// The signer produced a signature
    Completed(SignatureResponse),
    /// The signer gave up; the reason is signer-defined
    Failed(String),
}

/// The request/response boundary to the signing service.
///
/// Implementations decide the actual transport (contract call plus result
/// polling, HTTP, event subscription); the client only requires that
/// submission returns a correlatable id and that polling is cheap.
#[async_trait]
pub trait SignerTransport: Send + Sync {
    /// Submit a signing request. Fire-and-forget: the signer keeps working
    /// even if the caller later abandons the request.
    async fn submit(&self, request: &SignRequest) -> Result<RequestId>;

    /// Report the current status of a submitted request.
    async fn poll(&self, id: &RequestId) -> Result<SignStatus>;
}

/// Timing policy for the polling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Overall bound; expiry surfaces as [`Error::TimedOut`]
    pub timeout: Duration,
    /// Initial delay between polls
    pub poll_interval: Duration,
    /// Backoff ceiling
    pub max_poll_interval: Duration,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
            max_poll_interval: Duration::from_secs(10),
        }
    }
}

/// An outstanding signing request.
///
/// Abandoning a handle (dropping it without awaiting) does not cancel
/// signer-side computation; it only guarantees the caller never observes a
/// late result for it.
#[derive(Debug, Clone)]
pub struct SigningRequestHandle {
    request_id: RequestId,
    request: SignRequest,
}

impl SigningRequestHandle {
    /// The transport's correlation id.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// The request this handle tracks.
    pub fn request(&self) -> &SignRequest {
        &self.request
    }
}

/// Client over a [`SignerTransport`] with submit/await semantics.
pub struct SigningClient<T> {
    transport: T,
    config: SignerConfig,
}

impl<T: SignerTransport> SigningClient<T> {
    pub fn new(transport: T, config: SignerConfig) -> Self {
        Self { transport, config }
    }

    /// Submit a signing request for `payload` under (path, key_version).
    pub async fn request_signature(
        &self,
        payload: [u8; 32],
        path: &str,
        key_version: u32,
    ) -> Result<SigningRequestHandle> {
        let request = SignRequest {
            payload,
            path: path.to_string(),
            key_version,
        };
        let request_id = self.transport.submit(&request).await?;
        debug!(%request_id, path, key_version, "signing request submitted");
        Ok(SigningRequestHandle { request_id, request })
    }

    /// Await the result of a submitted request.
    ///
    /// Polls with doubling backoff until the signer completes, fails, or the
    /// configured timeout elapses. Timeout is retryable: re-submission with
    /// identical inputs derives the same child key.
    pub async fn await_result(&self, handle: &SigningRequestHandle) -> Result<RawSignature> {
        let poll_loop = async {
            let mut interval = self.config.poll_interval;
            loop {
                match self.transport.poll(&handle.request_id).await? {
                    SignStatus::Completed(response) => {
                        debug!(request_id = %handle.request_id, "signing request completed");
                        return response.to_raw();
                    }
                    SignStatus::Failed(reason) => {
                        debug!(request_id = %handle.request_id, %reason, "signing request rejected");
                        return Err(Error::Rejected(reason));
                    }
                    SignStatus::Pending => {}
                }
                tokio::time::sleep(interval).await;
                interval = (interval * 2).min(self.config.max_poll_interval);
            }
        };

        tokio::time::timeout(self.config.timeout, poll_loop)
            .await
            .map_err(|_| Error::TimedOut(self.config.timeout))?
    }

    /// Submit and await in one step.
    pub async fn sign(
        &self,
        payload: [u8; 32],
        path: &str,
        key_version: u32,
    ) -> Result<RawSignature> {
        let handle = self.request_signature(payload, path, key_version).await?;
        self.await_result(&handle).await
    }
}
