//! Error type shared by the Google Cloud clients.

use thiserror::Error;

use crate::retry::{Retryable, status_is_retryable};

/// Errors produced while talking to Google Cloud APIs.
#[derive(Debug, Error)]
pub enum GcpError {
    /// The request never produced an HTTP response.
    #[error("gcp transport failure: {0}")]
    Transport(String),

    /// The API answered with a non-success status.
    #[error("gcp api returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// The API answered with a body the client could not interpret.
    #[error("invalid gcp response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GcpError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl Retryable for GcpError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => status_is_retryable(*status),
            Self::InvalidResponse(_) => false,
        }
    }
}
