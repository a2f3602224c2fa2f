//! Error types for the GitHub App client.

use thiserror::Error;

use super::signer::SignerError;
use crate::retry::{Retryable, status_is_retryable};

/// Errors produced while talking to the GitHub API.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// The request never produced an HTTP response.
    #[error("github transport failure: {0}")]
    Transport(String),

    /// GitHub answered with a non-success status. The status is preserved
    /// verbatim so callers can distinguish client errors from server faults.
    #[error("github api returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// The App JWT assertion could not be signed.
    #[error("failed to sign app assertion: {0}")]
    Signer(#[from] SignerError),

    /// GitHub answered with a body the client could not interpret.
    #[error("invalid github response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GitHubError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl Retryable for GitHubError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => status_is_retryable(*status),
            Self::Signer(err) => err.is_retryable(),
            Self::InvalidResponse(_) => false,
        }
    }
}
