//! Build submission for ephemeral runner instances.
//!
//! Each accepted webhook event turns into one or more build jobs, each
//! carrying a compressed JIT registration in its substitutions. The
//! [`RunnerLauncher`] trait is the seam the webhook ingress spawns through;
//! implementations exist for Cloud Build ([`CloudBuildClient`]) and for an
//! external runner endpoint ([`ExternalRunnerClient`]).

pub mod build;
pub mod codec;
mod error;
mod external;
mod rest;

use async_trait::async_trait;

pub use build::BuildParams;
pub use error::BuildError;
pub use external::ExternalRunnerClient;
pub use rest::CloudBuildClient;

/// One runner instance to start.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// The freshly generated runner id, also used as the runner name.
    pub runner_name: String,

    /// The opaque JIT registration blob as returned by GitHub.
    pub jit_config: String,

    /// The runner class label chosen by admission.
    pub label: String,
}

/// Launches a single runner instance in the build backend.
#[async_trait]
pub trait RunnerLauncher: Send + Sync {
    /// Submits one build (or equivalent) for `request`. Transient backend
    /// failures are retried internally; the terminal error is surfaced.
    async fn launch(&self, request: &LaunchRequest) -> Result<(), BuildError>;
}
