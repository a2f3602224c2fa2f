//! The discovery job: one reconcile cycle per invocation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use ghad_core::discovery::{DiscoveryConfig, DiscoveryJob};
use ghad_core::gcp::{AssetInventoryClient, MetadataTokenProvider, WorkerPoolsClient};
use ghad_core::registry::RedisRegistry;
use ghad_core::retry::RetryPolicy;
use tracing::info;

/// Runs one discovery cycle; a non-zero exit hands the retry decision back
/// to the scheduler.
pub async fn run(deadline_seconds: Option<u64>) -> Result<()> {
    let config = DiscoveryConfig::from_env().context("failed to load discovery configuration")?;

    let registry = Arc::new(
        RedisRegistry::connect(&config.redis_host, config.redis_port)
            .await
            .context("failed to connect to registry")?,
    );

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(15))
        .timeout(Duration::from_secs(60))
        .build()
        .context("failed to build http client")?;

    let retry = RetryPolicy::default();
    let tokens = Arc::new(MetadataTokenProvider::new(http.clone()));
    let job = DiscoveryJob::new(
        Arc::new(AssetInventoryClient::new(
            http.clone(),
            tokens.clone(),
            retry,
        )),
        Arc::new(WorkerPoolsClient::new(http, tokens, retry)),
        registry,
        config,
    );

    let cycle = job.run_cycle();
    let summary = match deadline_seconds {
        Some(seconds) => match tokio::time::timeout(Duration::from_secs(seconds), cycle).await {
            Ok(result) => result,
            Err(_) => bail!("discovery cycle exceeded its {seconds}s deadline"),
        },
        None => cycle.await,
    }
    .context("discovery cycle failed")?;

    info!(
        projects_found = summary.projects_found,
        projects_admitted = summary.projects_admitted,
        classes = summary.classes,
        deleted = summary.deleted,
        written = summary.written,
        transacted = summary.transacted,
        "discovery cycle complete"
    );

    Ok(())
}
