//! Parsing of `workflow_job` webhook deliveries.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::WebhookError;

/// Event types that are expected but carry nothing to dispatch: GitHub App
/// installation management.
const IGNORED_EVENT_TYPES: &[&str] = &["installation", "installation_repositories"];

/// A `workflow_job` delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowJobEvent {
    pub action: Option<String>,
    pub workflow_job: Option<WorkflowJob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation: Option<Installation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<Organization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowJob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installation {
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub login: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: Option<String>,
}

impl WorkflowJob {
    /// Time the job spent queued, when both timestamps are present.
    #[must_use]
    pub fn queued_duration(&self) -> Option<Duration> {
        Some(self.started_at? - self.created_at?)
    }

    /// Time the job spent running, when both timestamps are present.
    #[must_use]
    pub fn in_progress_duration(&self) -> Option<Duration> {
        Some(self.completed_at? - self.started_at?)
    }

    /// Time from creation to completion, when both timestamps are present.
    #[must_use]
    pub fn total_duration(&self) -> Option<Duration> {
        Some(self.completed_at? - self.created_at?)
    }
}

impl WorkflowJobEvent {
    /// Returns the `(installation id, org login, repo name)` triple required
    /// for spawning.
    ///
    /// # Errors
    ///
    /// Lists every missing field so the operator sees the whole problem at
    /// once.
    pub fn spawn_fields(&self) -> Result<(i64, &str, &str), WebhookError> {
        let installation_id = self.installation.as_ref().and_then(|i| i.id);
        let org = self
            .organization
            .as_ref()
            .and_then(|o| o.login.as_deref())
            .filter(|login| !login.is_empty());
        let repo = self
            .repository
            .as_ref()
            .and_then(|r| r.name.as_deref())
            .filter(|name| !name.is_empty());

        match (installation_id, org, repo) {
            (Some(installation_id), Some(org), Some(repo)) => Ok((installation_id, org, repo)),
            _ => {
                let mut missing = Vec::new();
                if installation_id.is_none() {
                    missing.push("installation.id");
                }
                if org.is_none() {
                    missing.push("organization.login");
                }
                if repo.is_none() {
                    missing.push("repository.name");
                }
                Err(WebhookError::MissingEventFields(missing.join(", ")))
            },
        }
    }
}

/// Outcome of parsing a delivery body against its declared event type.
#[derive(Debug)]
pub enum ParsedEvent {
    /// A validated `workflow_job` event.
    WorkflowJob(Box<WorkflowJobEvent>),

    /// An installation-management event: acknowledged and dropped.
    Ignored { event_type: String },
}

/// Parses `body` as the event declared by the `X-GitHub-Event` header.
///
/// # Errors
///
/// Unknown event types are rejected; `workflow_job` bodies must carry both
/// `action` and `workflow_job`.
pub fn parse_event(event_type: &str, body: &[u8]) -> Result<ParsedEvent, WebhookError> {
    if IGNORED_EVENT_TYPES.contains(&event_type) {
        return Ok(ParsedEvent::Ignored {
            event_type: event_type.to_string(),
        });
    }

    if event_type != "workflow_job" {
        return Err(WebhookError::UnexpectedEventType(event_type.to_string()));
    }

    let event: WorkflowJobEvent = serde_json::from_slice(body)
        .map_err(|err| WebhookError::InvalidPayload(err.to_string()))?;

    let mut missing = Vec::new();
    if event.action.is_none() {
        missing.push("action");
    }
    if event.workflow_job.is_none() {
        missing.push("workflow_job");
    }
    if !missing.is_empty() {
        return Err(WebhookError::InvalidPayload(format!(
            "event is missing required field(s): {}",
            missing.join(", ")
        )));
    }

    Ok(ParsedEvent::WorkflowJob(Box::new(event)))
}
