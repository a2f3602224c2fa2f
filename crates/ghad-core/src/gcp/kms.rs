//! App assertion signing backed by Cloud KMS asymmetric keys.
//!
//! The GitHub App private key lives in KMS and never enters the process.
//! Signing sends a SHA-256 digest of the JWT signing input to the
//! `asymmetricSign` endpoint of the configured crypto key version.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use super::auth::AccessTokenProvider;
use crate::github::{AppSigner, SignerError};

const KMS_BASE_URL: &str = "https://cloudkms.googleapis.com";

#[derive(Deserialize)]
struct AsymmetricSignResponse {
    signature: String,
}

/// [`AppSigner`] implementation over the Cloud KMS REST surface.
pub struct KmsSigner {
    http: reqwest::Client,
    base_url: String,
    /// Fully-qualified crypto key version, e.g.
    /// `projects/p/locations/l/keyRings/r/cryptoKeys/k/cryptoKeyVersions/1`.
    key_version: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl KmsSigner {
    /// Creates a signer for the given crypto key version.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        key_version: impl Into<String>,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Self {
        Self::with_base_url(http, KMS_BASE_URL, key_version, tokens)
    }

    /// Creates a signer against an explicit KMS address. Used by tests.
    #[must_use]
    pub fn with_base_url(
        http: reqwest::Client,
        base_url: impl Into<String>,
        key_version: impl Into<String>,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            key_version: key_version.into(),
            tokens,
        }
    }
}

#[async_trait]
impl AppSigner for KmsSigner {
    async fn sign_rs256(&self, signing_input: &[u8]) -> Result<Vec<u8>, SignerError> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|err| SignerError::Transport(err.to_string()))?;

        let digest = Sha256::digest(signing_input);
        let url = format!(
            "{}/v1/{}:asymmetricSign",
            self.base_url.trim_end_matches('/'),
            self.key_version
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(&json!({
                "digest": { "sha256": STANDARD.encode(digest) },
            }))
            .send()
            .await
            .map_err(|err| SignerError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(SignerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: AsymmetricSignResponse = response
            .json()
            .await
            .map_err(|err| SignerError::InvalidResponse(err.to_string()))?;

        STANDARD
            .decode(body.signature)
            .map_err(|err| SignerError::InvalidResponse(format!("undecodable signature: {err}")))
    }
}
