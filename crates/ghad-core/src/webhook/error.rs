//! Error types for webhook admission.

use thiserror::Error;

/// Errors raised while admitting a webhook delivery.
///
/// All admission failures are client errors: they map to 400 and never
/// cause a spawn. Downstream failures during spawning are reported through
/// [`super::SpawnFailure`] instead.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// A required header is absent.
    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    /// The signature header is present but not `sha256=<hex>`.
    #[error("invalid signature format")]
    InvalidSignatureFormat,

    /// HMAC verification failed.
    #[error("signature mismatch")]
    InvalidSignature,

    /// The body could not be parsed as the declared event type.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The delivery declares an event type the dispatcher does not handle.
    #[error("unexpected event type: {0}")]
    UnexpectedEventType(String),

    /// A `queued` event is missing the fields required to spawn.
    #[error("event is missing required fields: {0}")]
    MissingEventFields(String),
}
