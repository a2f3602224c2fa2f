//! Verification of identity-aware proxy assertions.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Errors produced while verifying an IAP assertion.
///
/// The endpoint treats every variant the same way (403); the split exists
/// for logging.
#[derive(Debug, Error)]
pub enum IapError {
    /// The assertion failed verification or names a different audience.
    #[error("invalid IAP assertion: {0}")]
    Invalid(String),

    /// The verifier could not reach its backend.
    #[error("iap verification transport failure: {0}")]
    Transport(String),
}

/// Verifies the `x-goog-iap-jwt-assertion` header against an audience.
#[async_trait]
pub trait IapVerifier: Send + Sync {
    /// Returns `Ok(())` when `assertion` is valid for `audience`.
    async fn verify(&self, assertion: &str, audience: &str) -> Result<(), IapError>;
}

const TOKENINFO_BASE_URL: &str = "https://www.googleapis.com";

#[derive(Deserialize)]
struct TokenInfo {
    aud: String,
}

/// Remote verification through the token-info endpoint.
///
/// The endpoint validates the assertion's signature and expiry server-side;
/// the audience is checked here against the configured value.
pub struct TokenInfoVerifier {
    http: reqwest::Client,
    base_url: String,
}

impl TokenInfoVerifier {
    /// Creates a verifier against the public token-info endpoint.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, TOKENINFO_BASE_URL)
    }

    /// Creates a verifier against an explicit endpoint. Used by tests.
    #[must_use]
    pub fn with_base_url(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl IapVerifier for TokenInfoVerifier {
    async fn verify(&self, assertion: &str, audience: &str) -> Result<(), IapError> {
        let url = format!(
            "{}/oauth2/v3/tokeninfo",
            self.base_url.trim_end_matches('/')
        );

        let response = self
            .http
            .get(url)
            .query(&[("id_token", assertion)])
            .send()
            .await
            .map_err(|err| IapError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(IapError::Invalid(format!(
                "token rejected with status {}",
                response.status().as_u16()
            )));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|err| IapError::Invalid(format!("unusable tokeninfo response: {err}")))?;

        if info.aud != audience {
            return Err(IapError::Invalid(format!(
                "audience mismatch: expected {audience:?}, got {:?}",
                info.aud
            )));
        }

        Ok(())
    }
}
