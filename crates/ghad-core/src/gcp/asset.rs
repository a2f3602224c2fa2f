//! Cloud Asset Inventory search for runner host projects.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use super::GcpError;
use super::auth::AccessTokenProvider;
use crate::retry::{RetryPolicy, with_retries};

const ASSET_BASE_URL: &str = "https://cloudasset.googleapis.com";
const ASSET_TYPE_PROJECT: &str = "cloudresourcemanager.googleapis.com/Project";
const PAGE_SIZE: u32 = 500;

/// A project discovered by the asset search, reduced to what the discovery
/// plane needs: its id and labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub project_id: String,
    pub labels: BTreeMap<String, String>,
}

/// Searches for projects under a folder scope matching a label query.
#[async_trait]
pub trait ProjectSearch: Send + Sync {
    /// Returns every project under `folders/<folder_id>` whose labels
    /// satisfy all entries of `label_query` (each entry is `key=value`).
    async fn find_projects(
        &self,
        folder_id: &str,
        label_query: &[String],
    ) -> Result<Vec<ProjectInfo>, GcpError>;
}

#[derive(Deserialize)]
struct SearchAllResourcesResponse {
    #[serde(default)]
    results: Vec<ResourceSearchResult>,
    #[serde(default, rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ResourceSearchResult {
    /// e.g. `//cloudresourcemanager.googleapis.com/projects/project-id`
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

/// Asset Inventory client over REST with per-page retry.
pub struct AssetInventoryClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
    retry: RetryPolicy,
}

impl AssetInventoryClient {
    /// Creates a client against the public Asset Inventory endpoint.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<dyn AccessTokenProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self::with_base_url(http, ASSET_BASE_URL, tokens, retry)
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
        folder_id: &str,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<SearchAllResourcesResponse, GcpError> {
        let token = self.tokens.access_token().await?;
        let url = format!(
            "{}/v1/folders/{folder_id}:searchAllResources",
            self.base_url.trim_end_matches('/')
        );

        let page_size = PAGE_SIZE.to_string();
        let mut request = self
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .query(&[
                ("query", query),
                ("assetTypes", ASSET_TYPE_PROJECT),
                ("pageSize", page_size.as_str()),
            ]);
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
impl ProjectSearch for AssetInventoryClient {
    async fn find_projects(
        &self,
        folder_id: &str,
        label_query: &[String],
    ) -> Result<Vec<ProjectInfo>, GcpError> {
        let query = build_label_query(label_query);

        let mut projects = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = with_retries(&self.retry, || {
                self.fetch_page(folder_id, &query, page_token.as_deref())
            })
            .await?;

            projects.extend(page.results.into_iter().map(|result| {
                // The resource name ends with the project id.
                let project_id = result
                    .name
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                ProjectInfo {
                    project_id,
                    labels: result.labels,
                }
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(projects)
    }
}

/// Joins label query terms into the asset search syntax:
/// `labels.env=prod AND labels.team=ci`.
fn build_label_query(label_query: &[String]) -> String {
    label_query
        .iter()
        .map(|term| format!("labels.{term}"))
        .collect::<Vec<_>>()
        .join(" AND ")
}
