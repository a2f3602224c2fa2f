//! Access tokens for Google Cloud API calls.
//!
//! Production deployments run on infrastructure with a metadata server; the
//! [`MetadataTokenProvider`] fetches the default service-account token from
//! it and caches the token until shortly before expiry. Tests use
//! [`StaticTokenProvider`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::GcpError;

const METADATA_BASE_URL: &str = "http://metadata.google.internal";
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before their reported expiry.
const EXPIRY_SLACK: Duration = Duration::from_secs(60);

/// Source of OAuth2 access tokens for Google Cloud calls.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Returns a token valid for at least the next request.
    async fn access_token(&self) -> Result<SecretString, GcpError>;
}

#[derive(Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    token: SecretString,
    refresh_at: Instant,
}

/// Token provider backed by the instance metadata server.
pub struct MetadataTokenProvider {
    http: reqwest::Client,
    base_url: String,
    cache: Mutex<Option<CachedToken>>,
}

impl MetadataTokenProvider {
    /// Creates a provider against the standard metadata server address.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, METADATA_BASE_URL)
    }

    /// Creates a provider against an explicit metadata address. Used by
    /// tests pointed at a fake server.
    #[must_use]
    pub fn with_base_url(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            cache: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<CachedToken, GcpError> {
        let url = format!("{}{TOKEN_PATH}", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(GcpError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: MetadataTokenResponse = response
            .json()
            .await
            .map_err(|err| GcpError::InvalidResponse(err.to_string()))?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(EXPIRY_SLACK);
        Ok(CachedToken {
            token: SecretString::from(body.access_token),
            refresh_at: Instant::now() + lifetime,
        })
    }
}

#[async_trait]
impl AccessTokenProvider for MetadataTokenProvider {
    async fn access_token(&self) -> Result<SecretString, GcpError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(SecretString::from(
                    cached.token.expose_secret().to_string(),
                ));
            }
        }

        let fresh = self.fetch().await?;
        let token = SecretString::from(fresh.token.expose_secret().to_string());
        *cache = Some(fresh);
        Ok(token)
    }
}

/// Fixed-token provider for tests.
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    /// Wraps the given token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<SecretString, GcpError> {
        Ok(SecretString::from(self.token.expose_secret().to_string()))
    }
}
