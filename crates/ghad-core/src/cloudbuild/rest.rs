//! Cloud Build submission over REST.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use super::build::{self, BuildParams};
use super::{BuildError, LaunchRequest, RunnerLauncher, codec};
use crate::gcp::AccessTokenProvider;
use crate::retry::{RetryPolicy, with_retries};

const CLOUDBUILD_BASE_URL: &str = "https://cloudbuild.googleapis.com";

/// Submits runner builds to Cloud Build.
pub struct CloudBuildClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
    params: BuildParams,
    retry: RetryPolicy,
}

impl CloudBuildClient {
    /// Creates a client against the public Cloud Build endpoint.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<dyn AccessTokenProvider>,
        params: BuildParams,
        retry: RetryPolicy,
    ) -> Self {
        Self::with_base_url(http, CLOUDBUILD_BASE_URL, tokens, params, retry)
    }

    /// Creates a client against an explicit endpoint. Used by tests.
    #[must_use]
    pub fn with_base_url(
        http: reqwest::Client,
        base_url: impl Into<String>,
        tokens: Arc<dyn AccessTokenProvider>,
        params: BuildParams,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            tokens,
            params,
            retry,
        }
    }

    async fn create_build(&self, build: &build::Build) -> Result<(), BuildError> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|err| BuildError::Transport(err.to_string()))?;

        let url = format!(
            "{}/v1/projects/{}/locations/{}/builds",
            self.base_url.trim_end_matches('/'),
            self.params.project_id,
            self.params.location
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(build)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(BuildError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl RunnerLauncher for CloudBuildClient {
    async fn launch(&self, request: &LaunchRequest) -> Result<(), BuildError> {
        let compressed = codec::compress_and_encode(&request.jit_config)?;
        let build = build::assemble(&self.params, &compressed, chrono::Utc::now());

        tracing::info!(
            runner_name = %request.runner_name,
            label = %request.label,
            project_id = %self.params.project_id,
            location = %self.params.location,
            "submitting runner build"
        );

        with_retries(&self.retry, || self.create_build(&build)).await
    }
}
