//! Error types for build submission.

use thiserror::Error;

use crate::retry::{Retryable, status_is_retryable};

/// Errors produced while submitting builds.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The request never produced an HTTP response.
    #[error("build backend transport failure: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("build backend returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// The JIT payload could not be compressed for submission.
    #[error("failed to encode jit payload: {0}")]
    Codec(String),
}

impl From<reqwest::Error> for BuildError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl Retryable for BuildError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => status_is_retryable(*status),
            Self::Codec(_) => false,
        }
    }
}
