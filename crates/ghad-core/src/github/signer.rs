//! The remote signing seam used for the GitHub App JWT assertion.
//!
//! The App private key never enters the process. Signing is delegated to an
//! external key-management service through [`AppSigner`]; the concrete
//! implementation lives in [`crate::gcp::kms`]. The signer follows an
//! `init -> use* -> close` lifecycle and is shared read-only across requests.

use async_trait::async_trait;
use thiserror::Error;

use crate::retry::{Retryable, status_is_retryable};

/// Errors produced by the remote signing service.
#[derive(Debug, Error)]
pub enum SignerError {
    /// The signing request never produced a response.
    #[error("signer transport failure: {0}")]
    Transport(String),

    /// The signing service answered with a non-success status.
    #[error("signer returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// The signing service answered with an unusable body.
    #[error("invalid signer response: {0}")]
    InvalidResponse(String),
}

impl Retryable for SignerError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => status_is_retryable(*status),
            Self::InvalidResponse(_) => false,
        }
    }
}

/// Produces RS256 signatures for GitHub App JWT assertions.
#[async_trait]
pub trait AppSigner: Send + Sync {
    /// Signs `signing_input` (the `base64url(header).base64url(claims)`
    /// bytes) and returns the raw PKCS#1 v1.5 signature.
    async fn sign_rs256(&self, signing_input: &[u8]) -> Result<Vec<u8>, SignerError>;
}
