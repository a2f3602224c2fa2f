//! Core library for the GitHub Actions runner dispatcher.
//!
//! The dispatcher turns `workflow_job` webhook deliveries into ephemeral,
//! just-in-time (JIT) self-hosted runners executed as Cloud Build builds, and
//! periodically reconciles a shared registry that maps runner classes to the
//! worker pools currently able to execute them.
//!
//! The crate is split along the two planes of the service:
//!
//! - **Dispatch plane**: [`webhook`] (HMAC-validated ingress), [`jitconfig`]
//!   (IAP-guarded on-demand JIT endpoint), [`github`] (App token + JIT
//!   minting) and [`cloudbuild`] (build submission).
//! - **Discovery plane**: [`gcp`] (asset search and worker-pool listing),
//!   [`discovery`] (the reconcile cycle) and [`registry`] (the shared
//!   key/value store).
//!
//! The planes share nothing but the registry contract; the dispatch plane
//! never reads the registry.

pub mod cloudbuild;
pub mod discovery;
pub mod gcp;
pub mod github;
pub mod jitconfig;
pub mod registry;
pub mod retry;
pub mod webhook;
