//! The discovery plane: one reconcile cycle per scheduled invocation.
//!
//! A cycle walks `DISCOVER -> ENUMERATE -> GROUP -> SCAN -> TRANSACT`. Any
//! failure before the transaction aborts the cycle and leaves the registry
//! untouched; once the transaction is submitted, atomicity is the store's
//! responsibility. A project missing its required labels is skipped with a
//! warning, but a worker-pool listing failure aborts the whole cycle so a
//! half-enumerated cycle can never shrink the registry.

mod config;
mod plan;
mod project;

use std::sync::Arc;

use thiserror::Error;

pub use config::{DiscoveryConfig, DiscoveryConfigError};
pub use plan::PoolObservations;
pub use project::RunnerProject;

use crate::gcp::{GcpError, ProjectSearch, WorkerPoolLister};
use crate::registry::{RegistryError, RegistryStore};

/// Errors that abort a discovery cycle.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The project search failed.
    #[error("failed to get projects: {0}")]
    Search(#[source] GcpError),

    /// Listing worker pools for a project failed.
    #[error("failed to list worker pools for {project_id}: {source}")]
    WorkerPools {
        project_id: String,
        #[source]
        source: GcpError,
    },

    /// The registry scan or transaction failed.
    #[error("registry failure: {0}")]
    Registry(#[from] RegistryError),
}

/// What one cycle did, for the scheduler's logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    /// Projects returned by the search.
    pub projects_found: usize,

    /// Projects that passed the required-label check.
    pub projects_admitted: usize,

    /// Distinct runner classes observed.
    pub classes: usize,

    /// Keys deleted by the transaction.
    pub deleted: usize,

    /// Keys written by the transaction.
    pub written: usize,

    /// Whether a transaction was submitted at all.
    pub transacted: bool,
}

/// Drives one discovery cycle over the search, listing and registry seams.
pub struct DiscoveryJob {
    projects: Arc<dyn ProjectSearch>,
    pools: Arc<dyn WorkerPoolLister>,
    registry: Arc<dyn RegistryStore>,
    config: DiscoveryConfig,
}

impl DiscoveryJob {
    /// Creates a job over the given seams.
    #[must_use]
    pub fn new(
        projects: Arc<dyn ProjectSearch>,
        pools: Arc<dyn WorkerPoolLister>,
        registry: Arc<dyn RegistryStore>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            projects,
            pools,
            registry,
            config,
        }
    }

    /// Runs one reconcile cycle.
    ///
    /// # Errors
    ///
    /// Any failure aborts the cycle; failures before the transaction leave
    /// the registry untouched.
    pub async fn run_cycle(&self) -> Result<CycleSummary, DiscoveryError> {
        let projects = self
            .projects
            .find_projects(&self.config.gcp_folder_id, &self.config.label_query)
            .await
            .map_err(DiscoveryError::Search)?;
        tracing::info!(count = projects.len(), "discovered projects");

        let mut observations = PoolObservations::new();
        let mut admitted = 0usize;
        for project in &projects {
            let runner_project = match RunnerProject::from_project(project) {
                Ok(runner_project) => runner_project,
                Err(missing) => {
                    tracing::warn!(
                        project_id = %project.project_id,
                        missing_labels = ?missing,
                        "skipping project without required runner labels"
                    );
                    continue;
                },
            };
            admitted += 1;

            let pools = self
                .pools
                .list_worker_pools(&runner_project.project_id, &runner_project.location)
                .await
                .map_err(|source| DiscoveryError::WorkerPools {
                    project_id: runner_project.project_id.clone(),
                    source,
                })?;

            let class_key = runner_project.class_key();
            for pool in pools {
                let Some(machine_type) = pool.private_machine_type() else {
                    tracing::debug!(
                        worker_pool = %pool.name,
                        "skipping pool without a private worker config"
                    );
                    continue;
                };
                tracing::info!(
                    project_id = %runner_project.project_id,
                    worker_pool = %pool.name,
                    machine_type = %machine_type,
                    class_key = %class_key,
                    "found worker pool"
                );
                observations.record(class_key.clone(), pool.name.clone());
            }
        }

        let stale_keys = self
            .registry
            .scan(&format!("{}:*", self.config.registry_key_prefix))
            .await?;

        let mut summary = CycleSummary {
            projects_found: projects.len(),
            projects_admitted: admitted,
            classes: observations.class_count(),
            deleted: stale_keys.len(),
            written: 0,
            transacted: false,
        };

        if stale_keys.is_empty() && observations.is_empty() {
            tracing::info!("no keys to delete or set in registry, skipping transaction");
            summary.deleted = 0;
            return Ok(summary);
        }

        let plan = observations.into_plan(stale_keys);
        summary.written = plan.sets.len();
        self.registry.execute(&plan).await?;
        summary.transacted = true;

        for (key, value) in &plan.sets {
            tracing::info!(key = %key, value = %value, "cached worker pools");
        }

        Ok(summary)
    }
}
