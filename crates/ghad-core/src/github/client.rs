//! GitHub API client backed by GitHub App installation tokens.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::jwt;
use super::signer::AppSigner;
use super::{GitHubError, JitProvider};
use crate::retry::{RetryPolicy, with_retries};

const GITHUB_API_VERSION: &str = "2022-11-28";

/// The runner group all JIT runners register into.
const DEFAULT_RUNNER_GROUP_ID: u32 = 1;

/// A single-use JIT runner registration as returned by GitHub.
///
/// The `encoded_jit_config` blob is opaque to the dispatcher: it is
/// compressed and handed to the build backend without inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitRunnerConfig {
    /// Metadata about the registered runner, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner: Option<serde_json::Value>,

    /// The opaque registration document the runner agent consumes.
    pub encoded_jit_config: String,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    token: String,
}

/// Client for the GitHub App surface the dispatcher needs: installation
/// token exchange, JIT config generation and runner removal.
pub struct GitHubClient {
    http: reqwest::Client,
    api_base_url: String,
    app_id: String,
    signer: Arc<dyn AppSigner>,
    retry: RetryPolicy,
}

impl GitHubClient {
    /// Creates a client against `api_base_url` (no trailing slash required).
    ///
    /// # Errors
    ///
    /// Returns an error if the App id or base URL is blank, or the HTTP
    /// client cannot be constructed.
    pub fn new(
        api_base_url: impl Into<String>,
        app_id: impl Into<String>,
        signer: Arc<dyn AppSigner>,
        retry: RetryPolicy,
    ) -> Result<Self, GitHubError> {
        let api_base_url = api_base_url.into();
        if api_base_url.trim().is_empty() {
            return Err(GitHubError::InvalidResponse(
                "api_base_url must not be empty".to_string(),
            ));
        }

        let app_id = app_id.into();
        if app_id.trim().is_empty() {
            return Err(GitHubError::InvalidResponse(
                "app_id must not be empty".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_base_url,
            app_id,
            signer,
            retry,
        })
    }

    fn build_url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.api_base_url.trim_end_matches('/'))
    }

    fn request(&self, method: Method, endpoint: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.build_url(endpoint))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "ghad-core/github")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }

    async fn parse_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, GitHubError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(GitHubError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|err| GitHubError::InvalidResponse(err.to_string()))
    }

    async fn expect_success(response: reqwest::Response) -> Result<(), GitHubError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read response body".to_string());
        Err(GitHubError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Mints a short-lived installation token scoped to
    /// `administration:write`.
    ///
    /// The App JWT assertion is rebuilt on every attempt so retries never
    /// reuse a stale assertion. The returned token is a value: callers use
    /// it for exactly one API call and drop it.
    ///
    /// # Errors
    ///
    /// Transient failures are retried under the shared policy; the terminal
    /// error is surfaced with the GitHub status code intact.
    pub async fn mint_installation_token(
        &self,
        installation_id: i64,
    ) -> Result<SecretString, GitHubError> {
        let endpoint = format!("/app/installations/{installation_id}/access_tokens");

        let response: AccessTokenResponse = with_retries(&self.retry, || async {
            let assertion = jwt::app_assertion(
                &self.app_id,
                chrono::Utc::now().timestamp(),
                self.signer.as_ref(),
            )
            .await?;

            let response = self
                .request(Method::POST, &endpoint)
                .bearer_auth(assertion)
                .json(&json!({
                    "permissions": { "administration": "write" },
                }))
                .send()
                .await?;

            Self::parse_json(response).await
        })
        .await?;

        Ok(SecretString::from(response.token))
    }

    async fn generate_jit_config(
        &self,
        installation_id: i64,
        endpoint: &str,
        runner_name: &str,
        labels: &[String],
    ) -> Result<JitRunnerConfig, GitHubError> {
        let token = self.mint_installation_token(installation_id).await?;

        with_retries(&self.retry, || async {
            let response = self
                .request(Method::POST, endpoint)
                .bearer_auth(token.expose_secret())
                .json(&json!({
                    "name": runner_name,
                    "runner_group_id": DEFAULT_RUNNER_GROUP_ID,
                    "labels": labels,
                }))
                .send()
                .await?;

            Self::parse_json(response).await
        })
        .await
    }

    /// Removes a repository-scoped runner registration.
    ///
    /// # Errors
    ///
    /// Surfaces GitHub's status verbatim after retries are exhausted.
    pub async fn remove_repo_runner(
        &self,
        installation_id: i64,
        org: &str,
        repo: &str,
        runner_id: i64,
    ) -> Result<(), GitHubError> {
        let endpoint = format!("/repos/{org}/{repo}/actions/runners/{runner_id}");
        self.remove_runner(installation_id, &endpoint).await
    }

    /// Removes an organization-scoped runner registration.
    ///
    /// # Errors
    ///
    /// Surfaces GitHub's status verbatim after retries are exhausted.
    pub async fn remove_org_runner(
        &self,
        installation_id: i64,
        org: &str,
        runner_id: i64,
    ) -> Result<(), GitHubError> {
        let endpoint = format!("/orgs/{org}/actions/runners/{runner_id}");
        self.remove_runner(installation_id, &endpoint).await
    }

    async fn remove_runner(
        &self,
        installation_id: i64,
        endpoint: &str,
    ) -> Result<(), GitHubError> {
        let token = self.mint_installation_token(installation_id).await?;

        with_retries(&self.retry, || async {
            let response = self
                .request(Method::DELETE, endpoint)
                .bearer_auth(token.expose_secret())
                .send()
                .await?;

            Self::expect_success(response).await
        })
        .await
    }
}

#[async_trait]
impl JitProvider for GitHubClient {
    async fn repo_jit_config(
        &self,
        installation_id: i64,
        org: &str,
        repo: &str,
        runner_name: &str,
        labels: &[String],
    ) -> Result<JitRunnerConfig, GitHubError> {
        let endpoint = format!("/repos/{org}/{repo}/actions/runners/generate-jitconfig");
        self.generate_jit_config(installation_id, &endpoint, runner_name, labels)
            .await
    }

    async fn org_jit_config(
        &self,
        installation_id: i64,
        org: &str,
        runner_name: &str,
        labels: &[String],
    ) -> Result<JitRunnerConfig, GitHubError> {
        let endpoint = format!("/orgs/{org}/actions/runners/generate-jitconfig");
        self.generate_jit_config(installation_id, &endpoint, runner_name, labels)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jit_config_round_trips_through_json() {
        let raw = r#"{"runner":{"id":7,"name":"runner-a"},"encoded_jit_config":"b64blob"}"#;
        let config: JitRunnerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.encoded_jit_config, "b64blob");
        assert_eq!(config.runner.as_ref().unwrap()["id"], 7);

        let encoded = serde_json::to_value(&config).unwrap();
        assert_eq!(encoded["encoded_jit_config"], "b64blob");
        assert_eq!(encoded["runner"]["name"], "runner-a");
    }

    #[test]
    fn blank_configuration_is_rejected() {
        use async_trait::async_trait;

        use crate::github::signer::{AppSigner, SignerError};

        struct NoopSigner;

        #[async_trait]
        impl AppSigner for NoopSigner {
            async fn sign_rs256(&self, _input: &[u8]) -> Result<Vec<u8>, SignerError> {
                Ok(vec![1])
            }
        }

        let signer: Arc<dyn AppSigner> = Arc::new(NoopSigner);
        assert!(
            GitHubClient::new("", "app-id", Arc::clone(&signer), RetryPolicy::none()).is_err()
        );
        assert!(
            GitHubClient::new("https://api.github.com", " ", signer, RetryPolicy::none()).is_err()
        );
    }
}
