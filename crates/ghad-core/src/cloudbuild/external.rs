//! Runner launch through an external runner endpoint.
//!
//! When `EXTERNAL_RUNNER_ENDPOINT` is configured, runner instances are
//! requested from that endpoint instead of being submitted as Cloud Build
//! builds. The JIT blob is forwarded uncompressed; the endpoint owns its
//! own transport limits.

use async_trait::async_trait;
use serde::Serialize;

use super::{BuildError, LaunchRequest, RunnerLauncher};
use crate::retry::{RetryPolicy, with_retries};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunnerRequest<'a> {
    runner_name: &'a str,
    encoded_jit_config: &'a str,
    label: &'a str,
}

/// Posts runner launch requests to an external endpoint.
pub struct ExternalRunnerClient {
    http: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl ExternalRunnerClient {
    /// Creates a client posting to `endpoint`.
    #[must_use]
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            retry,
        }
    }

    async fn post(&self, request: &LaunchRequest) -> Result<(), BuildError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&RunnerRequest {
                runner_name: &request.runner_name,
                encoded_jit_config: &request.jit_config,
                label: &request.label,
            })
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
impl RunnerLauncher for ExternalRunnerClient {
    async fn launch(&self, request: &LaunchRequest) -> Result<(), BuildError> {
        tracing::info!(
            runner_name = %request.runner_name,
            label = %request.label,
            "requesting runner from external endpoint"
        );

        with_retries(&self.retry, || self.post(request)).await
    }
}
