//! GitHub App client for minting installation tokens and JIT runner
//! configurations.
//!
//! # Credentials as values
//!
//! Installation tokens are minted per request, passed explicitly, and
//! discarded when the request completes. The client never holds an
//! authenticated session; the only long-lived credential material is the
//! [`AppSigner`] handle backing the App JWT assertion, which delegates the
//! actual private-key operation to a remote signing service.

mod client;
mod error;
mod jwt;
mod signer;

use async_trait::async_trait;

pub use client::{GitHubClient, JitRunnerConfig};
pub use error::GitHubError;
pub use signer::{AppSigner, SignerError};

/// The seam between the HTTP endpoints and the GitHub App client.
///
/// Both the webhook ingress and the on-demand JIT endpoint spawn runners
/// through this trait so tests can substitute a mock.
#[async_trait]
pub trait JitProvider: Send + Sync {
    /// Generates a JIT runner configuration scoped to a repository.
    async fn repo_jit_config(
        &self,
        installation_id: i64,
        org: &str,
        repo: &str,
        runner_name: &str,
        labels: &[String],
    ) -> Result<JitRunnerConfig, GitHubError>;

    /// Generates a JIT runner configuration scoped to an organization.
    async fn org_jit_config(
        &self,
        installation_id: i64,
        org: &str,
        runner_name: &str,
        labels: &[String],
    ) -> Result<JitRunnerConfig, GitHubError>;
}
