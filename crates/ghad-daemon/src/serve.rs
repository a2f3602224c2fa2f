//! The dispatch plane server: wiring and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::response::Json;
use axum::routing::get;
use ghad_core::cloudbuild::{CloudBuildClient, ExternalRunnerClient, RunnerLauncher};
use ghad_core::gcp::{KmsSigner, MetadataTokenProvider};
use ghad_core::github::GitHubClient;
use ghad_core::jitconfig::{JitConfigHandler, TokenInfoVerifier};
use ghad_core::retry::RetryPolicy;
use ghad_core::webhook::{LabelPolicy, RunnerSpawner, WebhookConfig, WebhookHandler};
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

/// Builds every client from the environment and serves until SIGTERM or
/// SIGINT.
pub async fn run() -> Result<()> {
    let config = WebhookConfig::from_env().context("failed to load webhook configuration")?;
    let webhook_secret = config
        .read_webhook_secret()
        .context("failed to read webhook secret")?;

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(15))
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build http client")?;

    let retry = RetryPolicy::default();
    let tokens = Arc::new(MetadataTokenProvider::new(http.clone()));
    let signer = Arc::new(KmsSigner::new(
        http.clone(),
        config.kms_app_private_key_id.clone(),
        tokens.clone(),
    ));
    let github = Arc::new(
        GitHubClient::new(
            config.github_api_base_url.clone(),
            config.github_app_id.clone(),
            signer,
            retry,
        )
        .context("failed to build github client")?,
    );

    // Prefer the external runner endpoint when one is configured; Cloud
    // Build is the normal path.
    let launcher: Arc<dyn RunnerLauncher> = match &config.external_runner_endpoint {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "using external runner endpoint");
            Arc::new(ExternalRunnerClient::new(http.clone(), endpoint.clone(), retry))
        },
        None => Arc::new(CloudBuildClient::new(
            http.clone(),
            tokens,
            config.build_params(),
            retry,
        )),
    };

    let webhook = WebhookHandler::new(
        webhook_secret,
        LabelPolicy {
            runner_label: config.runner_label.clone(),
            enable_self_hosted_label: config.enable_self_hosted_label,
        },
        RunnerSpawner::new(github.clone(), launcher, config.extra_runner_count),
    );

    let jit_config = JitConfigHandler::new(
        Arc::new(TokenInfoVerifier::new(http)),
        config.iap_service_audience.clone(),
        config.jit_config_allowlist.clone(),
        github,
        config.github_app_installation_id,
    );

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/version", get(version))
        .merge(webhook.router())
        .merge(jit_config.router());

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(addr = %addr, environment = ?config.environment, "dispatcher serving");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("dispatcher shutdown complete");
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}
