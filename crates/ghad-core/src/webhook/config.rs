//! Environment configuration for the dispatch plane.
//!
//! Variable names and validation ranges follow the deployment contract:
//! timeouts are bounded, the extra-runner count is capped, and the runner
//! label must be non-blank. Loading is factored over a lookup function so
//! tests can drive it from a map instead of the process environment.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::cloudbuild::BuildParams;
use crate::jitconfig::Allowlist;

const MIN_RUNNER_IDLE_TIMEOUT_SECS: u32 = 5 * 60;
const MAX_RUNNER_IDLE_TIMEOUT_SECS: u32 = 24 * 60 * 60;

const MIN_RUNNER_EXECUTION_TIMEOUT_SECS: u32 = 60 * 60;
const MAX_RUNNER_EXECUTION_TIMEOUT_SECS: u32 = 24 * 60 * 60;

const MAX_EXTRA_RUNNER_COUNT: u32 = 10;

/// Execution environment of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Autopush,
}

impl std::str::FromStr for Environment {
    type Err = WebhookConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "production" => Ok(Self::Production),
            "autopush" => Ok(Self::Autopush),
            other => Err(WebhookConfigError::Invalid {
                name: "ENVIRONMENT",
                reason: format!("must be one of 'production' or 'autopush', got {other:?}"),
            }),
        }
    }
}

/// Errors raised while loading or validating the dispatch configuration.
#[derive(Debug, Error)]
pub enum WebhookConfigError {
    /// A required variable is absent.
    #[error("{0} is required")]
    Missing(&'static str),

    /// A variable is present but unusable.
    #[error("{name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    /// The webhook secret file could not be read.
    #[error("failed to read webhook secret from {path}: {source}")]
    SecretUnreadable {
        path: String,
        source: std::io::Error,
    },
}

/// Configuration of the webhook service, loaded once at startup.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub environment: Environment,
    pub github_api_base_url: String,
    pub github_app_id: String,
    pub github_app_installation_id: i64,
    pub webhook_key_mount_path: PathBuf,
    pub webhook_key_name: String,
    pub kms_app_private_key_id: String,
    pub port: u16,
    pub runner_execution_timeout_secs: u32,
    pub runner_idle_timeout_secs: u32,
    pub extra_runner_count: u32,
    pub runner_label: String,
    pub enable_self_hosted_label: bool,
    pub runner_image_name: String,
    pub runner_image_tag: String,
    pub runner_location: String,
    pub runner_project_id: String,
    pub runner_repository_id: String,
    pub runner_service_account: String,
    pub runner_worker_pool_id: Option<String>,
    pub jit_config_allowlist: Allowlist,
    pub iap_service_audience: String,
    pub external_runner_endpoint: Option<String>,
    pub e2e_test_run_id: Option<String>,
}

impl WebhookConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid variable.
    pub fn from_env() -> Result<Self, WebhookConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration from a map. Test entry point.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid variable.
    pub fn from_map(vars: &HashMap<&str, &str>) -> Result<Self, WebhookConfigError> {
        Self::from_lookup(|name| vars.get(name).map(ToString::to_string))
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, WebhookConfigError> {
        let environment = lookup("ENVIRONMENT")
            .unwrap_or_else(|| "production".to_string())
            .parse()?;

        let github_api_base_url = lookup("GITHUB_API_BASE_URL")
            .unwrap_or_else(|| "https://api.github.com".to_string());
        let github_app_id = required(&lookup, "GITHUB_APP_ID")?;
        let github_app_installation_id =
            parse_number(&lookup, "GITHUB_APP_INSTALLATION_ID", None)?;

        let webhook_key_mount_path =
            PathBuf::from(required(&lookup, "WEBHOOK_KEY_MOUNT_PATH")?);
        let webhook_key_name = required(&lookup, "WEBHOOK_KEY_NAME")?;
        let kms_app_private_key_id = required(&lookup, "KMS_APP_PRIVATE_KEY_ID")?;

        let port: u16 = parse_number(&lookup, "PORT", Some("8080"))?;

        let runner_execution_timeout_secs: u32 =
            parse_number(&lookup, "RUNNER_EXECUTION_TIMEOUT_SECONDS", Some("3600"))?;
        if !(MIN_RUNNER_EXECUTION_TIMEOUT_SECS..=MAX_RUNNER_EXECUTION_TIMEOUT_SECS)
            .contains(&runner_execution_timeout_secs)
        {
            return Err(WebhookConfigError::Invalid {
                name: "RUNNER_EXECUTION_TIMEOUT_SECONDS",
                reason: format!(
                    "must be between {MIN_RUNNER_EXECUTION_TIMEOUT_SECS} (1 hour) and {MAX_RUNNER_EXECUTION_TIMEOUT_SECS} (24 hours) seconds, got {runner_execution_timeout_secs}"
                ),
            });
        }

        let runner_idle_timeout_secs: u32 =
            parse_number(&lookup, "RUNNER_IDLE_TIMEOUT_SECONDS", Some("300"))?;
        if !(MIN_RUNNER_IDLE_TIMEOUT_SECS..=MAX_RUNNER_IDLE_TIMEOUT_SECS)
            .contains(&runner_idle_timeout_secs)
        {
            return Err(WebhookConfigError::Invalid {
                name: "RUNNER_IDLE_TIMEOUT_SECONDS",
                reason: format!(
                    "must be between {MIN_RUNNER_IDLE_TIMEOUT_SECS} (5 minutes) and {MAX_RUNNER_IDLE_TIMEOUT_SECS} (24 hours) seconds, got {runner_idle_timeout_secs}"
                ),
            });
        }

        let extra_runner_count: u32 = parse_number(&lookup, "EXTRA_RUNNER_COUNT", Some("0"))?;
        if extra_runner_count >= MAX_EXTRA_RUNNER_COUNT {
            return Err(WebhookConfigError::Invalid {
                name: "EXTRA_RUNNER_COUNT",
                reason: format!("must be in the range [0,{MAX_EXTRA_RUNNER_COUNT})"),
            });
        }

        let runner_label = lookup("RUNNER_LABEL").unwrap_or_else(|| "self-hosted".to_string());
        if runner_label.trim().is_empty() {
            return Err(WebhookConfigError::Missing("RUNNER_LABEL"));
        }

        let enable_self_hosted_label = parse_bool(&lookup, "ENABLE_SELF_HOSTED_LABEL")?;

        let jit_config_allowlist = match lookup("JIT_CONFIG_ALLOWLIST") {
            Some(raw) if !raw.trim().is_empty() => {
                Allowlist::from_json(&raw).map_err(|err| WebhookConfigError::Invalid {
                    name: "JIT_CONFIG_ALLOWLIST",
                    reason: err.to_string(),
                })?
            },
            _ => Allowlist::default(),
        };

        Ok(Self {
            environment,
            github_api_base_url,
            github_app_id,
            github_app_installation_id,
            webhook_key_mount_path,
            webhook_key_name,
            kms_app_private_key_id,
            port,
            runner_execution_timeout_secs,
            runner_idle_timeout_secs,
            extra_runner_count,
            runner_label,
            enable_self_hosted_label,
            runner_image_name: lookup("RUNNER_IMAGE_NAME")
                .unwrap_or_else(|| "default-runner".to_string()),
            runner_image_tag: lookup("RUNNER_IMAGE_TAG").unwrap_or_else(|| "latest".to_string()),
            runner_location: required(&lookup, "RUNNER_LOCATION")?,
            runner_project_id: required(&lookup, "RUNNER_PROJECT_ID")?,
            runner_repository_id: required(&lookup, "RUNNER_REPOSITORY_ID")?,
            runner_service_account: required(&lookup, "RUNNER_SERVICE_ACCOUNT")?,
            runner_worker_pool_id: optional(&lookup, "RUNNER_WORKER_POOL_ID"),
            jit_config_allowlist,
            iap_service_audience: required(&lookup, "IAP_SERVICE_AUDIENCE")?,
            external_runner_endpoint: optional(&lookup, "EXTERNAL_RUNNER_ENDPOINT"),
            e2e_test_run_id: optional(&lookup, "E2E_TEST_RUN_ID"),
        })
    }

    /// Reads the shared webhook HMAC secret from its file mount.
    ///
    /// # Errors
    ///
    /// Surfaces the path together with the I/O failure.
    pub fn read_webhook_secret(&self) -> Result<Vec<u8>, WebhookConfigError> {
        let path = self.webhook_key_mount_path.join(&self.webhook_key_name);
        std::fs::read(&path).map_err(|source| WebhookConfigError::SecretUnreadable {
            path: path.display().to_string(),
            source,
        })
    }

    /// Derives the fixed build parameters for the Cloud Build submitter.
    #[must_use]
    pub fn build_params(&self) -> BuildParams {
        BuildParams {
            project_id: self.runner_project_id.clone(),
            location: self.runner_location.clone(),
            service_account: self.runner_service_account.clone(),
            repository_id: self.runner_repository_id.clone(),
            image_name: self.runner_image_name.clone(),
            image_tag: self.runner_image_tag.clone(),
            execution_timeout_secs: self.runner_execution_timeout_secs,
            idle_timeout_secs: self.runner_idle_timeout_secs,
            worker_pool_id: self.runner_worker_pool_id.clone(),
            e2e_test_run_id: self.e2e_test_run_id.clone(),
        }
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, WebhookConfigError> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(WebhookConfigError::Missing(name)),
    }
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|value| !value.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Option<&str>,
) -> Result<T, WebhookConfigError> {
    let raw = match (lookup(name), default) {
        (Some(value), _) => value,
        (None, Some(default)) => default.to_string(),
        (None, None) => return Err(WebhookConfigError::Missing(name)),
    };

    raw.parse().map_err(|_| WebhookConfigError::Invalid {
        name,
        reason: format!("must be an integer, got {raw:?}"),
    })
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<bool, WebhookConfigError> {
    match lookup(name).as_deref() {
        None | Some("") => Ok(false),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(WebhookConfigError::Invalid {
            name,
            reason: format!("must be 'true' or 'false', got {other:?}"),
        }),
    }
}
