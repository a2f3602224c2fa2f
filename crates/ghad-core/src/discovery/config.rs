//! Environment configuration for the discovery job.

use std::collections::HashMap;

use thiserror::Error;

/// Errors raised while loading the discovery configuration.
#[derive(Debug, Error)]
pub enum DiscoveryConfigError {
    #[error("{0} must be provided")]
    Missing(&'static str),

    #[error("{name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Configuration of one discovery cycle.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Label query terms (`key=value`), all of which a project must match.
    pub label_query: Vec<String>,

    /// The folder scope searched for runner host projects.
    pub gcp_folder_id: String,

    /// Registry key prefix; keys are `<prefix>:<runner-type>:<runner-label>`.
    pub registry_key_prefix: String,

    pub redis_host: String,
    pub redis_port: u16,
}

impl DiscoveryConfig {
    /// Loads the configuration from the process environment. `LABEL_QUERY`
    /// is a comma-separated list.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid variable.
    pub fn from_env() -> Result<Self, DiscoveryConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration from a map. Test entry point.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid variable.
    pub fn from_map(vars: &HashMap<&str, &str>) -> Result<Self, DiscoveryConfigError> {
        Self::from_lookup(|name| vars.get(name).map(ToString::to_string))
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DiscoveryConfigError> {
        let label_query: Vec<String> = lookup("LABEL_QUERY")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(ToString::to_string)
            .collect();
        if label_query.is_empty() {
            return Err(DiscoveryConfigError::Missing("LABEL_QUERY"));
        }

        let gcp_folder_id = lookup("GCP_FOLDER_ID").unwrap_or_default();
        if gcp_folder_id.trim().is_empty() {
            return Err(DiscoveryConfigError::Missing("GCP_FOLDER_ID"));
        }

        let registry_key_prefix = lookup("RUNNER_REGISTRY_DEFAULT_KEY_PREFIX")
            .filter(|prefix| !prefix.trim().is_empty())
            .unwrap_or_else(|| "default".to_string());

        let redis_host = lookup("REDIS_HOST").unwrap_or_default();
        if redis_host.trim().is_empty() {
            return Err(DiscoveryConfigError::Missing("REDIS_HOST"));
        }

        let redis_port_raw = lookup("REDIS_PORT").unwrap_or_default();
        if redis_port_raw.trim().is_empty() {
            return Err(DiscoveryConfigError::Missing("REDIS_PORT"));
        }
        let redis_port: u16 =
            redis_port_raw
                .parse()
                .map_err(|_| DiscoveryConfigError::Invalid {
                    name: "REDIS_PORT",
                    reason: format!("must be a port number, got {redis_port_raw:?}"),
                })?;

        Ok(Self {
            label_query,
            gcp_folder_id,
            registry_key_prefix,
            redis_host,
            redis_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("LABEL_QUERY", "env=test"),
            ("GCP_FOLDER_ID", "1234567890"),
            ("REDIS_HOST", "10.0.0.5"),
            ("REDIS_PORT", "6379"),
        ])
    }

    #[test]
    fn valid_config_loads() {
        let config = DiscoveryConfig::from_map(&valid_vars()).unwrap();
        assert_eq!(config.label_query, vec!["env=test"]);
        assert_eq!(config.gcp_folder_id, "1234567890");
        assert_eq!(config.registry_key_prefix, "default");
        assert_eq!(config.redis_port, 6379);
    }

    #[test]
    fn label_query_is_comma_separated() {
        let mut vars = valid_vars();
        vars.insert("LABEL_QUERY", "env=test, team=ci");
        let config = DiscoveryConfig::from_map(&vars).unwrap();
        assert_eq!(config.label_query, vec!["env=test", "team=ci"]);
    }

    #[test]
    fn missing_label_query_is_rejected() {
        let mut vars = valid_vars();
        vars.remove("LABEL_QUERY");
        let err = DiscoveryConfig::from_map(&vars).unwrap_err();
        assert!(err.to_string().contains("LABEL_QUERY"));

        vars.insert("LABEL_QUERY", " , ,");
        assert!(DiscoveryConfig::from_map(&vars).is_err());
    }

    #[test]
    fn missing_folder_id_is_rejected() {
        let mut vars = valid_vars();
        vars.remove("GCP_FOLDER_ID");
        let err = DiscoveryConfig::from_map(&vars).unwrap_err();
        assert!(err.to_string().contains("GCP_FOLDER_ID"));
    }

    #[test]
    fn prefix_is_overridable() {
        let mut vars = valid_vars();
        vars.insert("RUNNER_REGISTRY_DEFAULT_KEY_PREFIX", "staging");
        let config = DiscoveryConfig::from_map(&vars).unwrap();
        assert_eq!(config.registry_key_prefix, "staging");
    }

    #[test]
    fn redis_endpoint_is_required() {
        for name in ["REDIS_HOST", "REDIS_PORT"] {
            let mut vars = valid_vars();
            vars.remove(name);
            assert!(DiscoveryConfig::from_map(&vars).is_err());
        }

        let mut vars = valid_vars();
        vars.insert("REDIS_PORT", "not-a-port");
        assert!(DiscoveryConfig::from_map(&vars).is_err());
    }
}
