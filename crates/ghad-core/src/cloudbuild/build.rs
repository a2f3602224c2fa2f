//! Assembly of the Cloud Build request for one runner instance.
//!
//! The build has a single step whose image reference and environment are
//! templated from substitutions, so the runner container receives the
//! compressed JIT registration, its idle timeout and the submission
//! timestamp without baking any of them into the image.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Fixed parameters of every runner build, loaded once from configuration.
#[derive(Debug, Clone)]
pub struct BuildParams {
    pub project_id: String,
    pub location: String,
    pub service_account: String,
    pub repository_id: String,
    pub image_name: String,
    pub image_tag: String,
    pub execution_timeout_secs: u32,
    pub idle_timeout_secs: u32,
    pub worker_pool_id: Option<String>,
    pub e2e_test_run_id: Option<String>,
}

/// A Cloud Build build in its JSON wire shape.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub service_account: String,
    /// Protobuf duration encoding, e.g. `"3600s"`.
    pub timeout: String,
    pub steps: Vec<BuildStep>,
    pub options: BuildOptions,
    pub substitutions: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BuildStep {
    pub id: String,
    pub name: String,
    pub env: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    pub logging: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolOption>,
}

#[derive(Debug, Serialize)]
pub struct PoolOption {
    pub name: String,
}

/// Assembles the build for one runner with the given compressed JIT blob.
#[must_use]
pub fn assemble(params: &BuildParams, compressed_jit: &str, created_at: DateTime<Utc>) -> Build {
    let mut substitutions = BTreeMap::new();
    substitutions.insert("_ENCODED_JIT_CONFIG".to_string(), compressed_jit.to_string());
    substitutions.insert(
        "_IDLE_TIMEOUT_SECONDS".to_string(),
        params.idle_timeout_secs.to_string(),
    );
    substitutions.insert("_REPOSITORY_ID".to_string(), params.repository_id.clone());
    substitutions.insert("_IMAGE_NAME".to_string(), params.image_name.clone());
    substitutions.insert("_IMAGE_TAG".to_string(), params.image_tag.clone());
    substitutions.insert(
        "_CREATE_BUILD_REQUEST_TIME_UTC".to_string(),
        created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );

    let tags = params.e2e_test_run_id.as_deref().map_or_else(Vec::new, |id| {
        vec!["e2e-test".to_string(), format!("e2e-run-id-{id}")]
    });

    Build {
        service_account: params.service_account.clone(),
        timeout: format!("{}s", params.execution_timeout_secs),
        steps: vec![BuildStep {
            id: "run".to_string(),
            name: "$_REPOSITORY_ID/$_IMAGE_NAME:$_IMAGE_TAG".to_string(),
            env: vec![
                "ENCODED_JIT_CONFIG=${_ENCODED_JIT_CONFIG}".to_string(),
                "IDLE_TIMEOUT_SECONDS=${_IDLE_TIMEOUT_SECONDS}".to_string(),
                "CREATE_BUILD_REQUEST_TIME_UTC=${_CREATE_BUILD_REQUEST_TIME_UTC}".to_string(),
            ],
        }],
        options: BuildOptions {
            logging: "CLOUD_LOGGING_ONLY",
            pool: params
                .worker_pool_id
                .clone()
                .map(|name| PoolOption { name }),
        },
        substitutions,
        tags,
    }
}
