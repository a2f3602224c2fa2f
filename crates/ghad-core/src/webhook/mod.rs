//! Webhook ingress for `workflow_job` events.
//!
//! The handler validates the HMAC-SHA256 delivery signature, parses the
//! event, applies the single-label admission policy and spawns one or more
//! ephemeral runners per accepted `queued` event. `in_progress` and
//! `completed` deliveries are logged (with queue/runtime durations) and
//! acknowledged without side effects.
//!
//! # Security model
//!
//! - Signatures are verified against the shared webhook secret with a
//!   constant-time comparison before the body is interpreted.
//! - The secret is read once at startup from a file mount and kept only in
//!   the validator.
//! - A body size limit bounds memory per request.

mod config;
mod error;
mod handler;
mod payload;
mod policy;
mod signature;
mod spawn;

pub use config::{Environment, WebhookConfig, WebhookConfigError};
pub use error::WebhookError;
pub use handler::WebhookHandler;
pub use payload::{
    Installation, Organization, ParsedEvent, Repository, WorkflowJob, WorkflowJobEvent,
    parse_event,
};
pub use policy::{
    LabelDecision, LabelPolicy, SELF_HOSTED_LABEL, SELF_HOSTED_UBUNTU_LATEST_LABEL,
};
pub use signature::SignatureValidator;
pub use spawn::{RunnerSpawner, SpawnFailure, SpawnFailureCause};
