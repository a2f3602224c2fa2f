//! Cloud Build worker-pool listing.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use super::GcpError;
use super::auth::AccessTokenProvider;
use crate::retry::{RetryPolicy, with_retries};

const CLOUDBUILD_BASE_URL: &str = "https://cloudbuild.googleapis.com";

/// A worker pool as returned by the listing API.
///
/// Only pools of the private configuration variant with a non-empty machine
/// type participate in discovery; [`WorkerPoolResource::private_machine_type`]
/// encodes that filter.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerPoolResource {
    /// Fully-qualified name:
    /// `projects/<p>/locations/<l>/workerPools/<id>`.
    pub name: String,

    #[serde(default, rename = "privatePoolV1Config")]
    private_pool_config: Option<PrivatePoolConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct PrivatePoolConfig {
    #[serde(default, rename = "workerConfig")]
    worker_config: Option<WorkerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct WorkerConfig {
    #[serde(default, rename = "machineType")]
    machine_type: String,
}

impl WorkerPoolResource {
    /// Constructs a private pool. Test helper.
    #[must_use]
    pub fn private(name: impl Into<String>, machine_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            private_pool_config: Some(PrivatePoolConfig {
                worker_config: Some(WorkerConfig {
                    machine_type: machine_type.into(),
                }),
            }),
        }
    }

    /// Constructs a pool without a private configuration. Test helper.
    #[must_use]
    pub fn non_private(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            private_pool_config: None,
        }
    }

    /// Returns the machine type when this pool is a private pool with a
    /// non-empty machine type, `None` otherwise.
    #[must_use]
    pub fn private_machine_type(&self) -> Option<&str> {
        let machine_type = self
            .private_pool_config
            .as_ref()?
            .worker_config
            .as_ref()?
            .machine_type
            .as_str();
        if machine_type.is_empty() {
            None
        } else {
            Some(machine_type)
        }
    }
}

/// Lists private worker pools in a `(project, location)`.
#[async_trait]
pub trait WorkerPoolLister: Send + Sync {
    /// Returns all worker pools for the given project and location.
    async fn list_worker_pools(
        &self,
        project_id: &str,
        location: &str,
    ) -> Result<Vec<WorkerPoolResource>, GcpError>;
}

#[derive(Deserialize)]
struct ListWorkerPoolsResponse {
    #[serde(default, rename = "workerPools")]
    worker_pools: Vec<WorkerPoolResource>,
    #[serde(default, rename = "nextPageToken")]
    next_page_token: Option<String>,
}

/// Worker-pool client over REST with per-page retry.
pub struct WorkerPoolsClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
    retry: RetryPolicy,
}

impl WorkerPoolsClient {
    /// Creates a client against the public Cloud Build endpoint.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<dyn AccessTokenProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self::with_base_url(http, CLOUDBUILD_BASE_URL, tokens, retry)
    }

    /// Creates a client against an explicit endpoint. Used by tests.
    #[must_use]
    pub fn with_base_url(
        http: reqwest::Client,
        base_url: impl Into<String>,
        tokens: Arc<dyn AccessTokenProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            tokens,
            retry,
        }
    }

    async fn fetch_page(
        &self,
        project_id: &str,
        location: &str,
        page_token: Option<&str>,
    ) -> Result<ListWorkerPoolsResponse, GcpError> {
        let token = self.tokens.access_token().await?;
        let url = format!(
            "{}/v1/projects/{project_id}/locations/{location}/workerPools",
            self.base_url.trim_end_matches('/')
        );

        let mut request = self.http.get(url).bearer_auth(token.expose_secret());
        if let Some(page_token) = page_token {
            request = request.query(&[("pageToken", page_token)]);
        }

        let response = request.send().await?;
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

        response
            .json()
            .await
            .map_err(|err| GcpError::InvalidResponse(err.to_string()))
    }
}

#[async_trait]
impl WorkerPoolLister for WorkerPoolsClient {
    async fn list_worker_pools(
        &self,
        project_id: &str,
        location: &str,
    ) -> Result<Vec<WorkerPoolResource>, GcpError> {
        let mut pools = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = with_retries(&self.retry, || {
                self.fetch_page(project_id, location, page_token.as_deref())
            })
            .await?;

            pools.extend(page.worker_pools);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(pools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_pool_exposes_machine_type() {
        let pool = WorkerPoolResource::private("projects/p/locations/l/workerPools/a", "e2-medium");
        assert_eq!(pool.private_machine_type(), Some("e2-medium"));
    }

    #[test]
    fn non_private_pool_is_filtered() {
        let pool = WorkerPoolResource::non_private("projects/p/locations/l/workerPools/b");
        assert_eq!(pool.private_machine_type(), None);
    }

    #[test]
    fn empty_machine_type_is_filtered() {
        let pool = WorkerPoolResource::private("projects/p/locations/l/workerPools/c", "");
        assert_eq!(pool.private_machine_type(), None);
    }

    #[test]
    fn listing_response_deserializes_api_shape() {
        let raw = r#"{
            "workerPools": [
                {
                    "name": "projects/p/locations/us-central1/workerPools/pool-a",
                    "privatePoolV1Config": {"workerConfig": {"machineType": "e2-medium"}}
                },
                {"name": "projects/p/locations/us-central1/workerPools/pool-b"}
            ],
            "nextPageToken": ""
        }"#;
        let page: ListWorkerPoolsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(page.worker_pools.len(), 2);
        assert_eq!(page.worker_pools[0].private_machine_type(), Some("e2-medium"));
        assert_eq!(page.worker_pools[1].private_machine_type(), None);
        assert_eq!(page.next_page_token.as_deref(), Some(""));
    }
}
