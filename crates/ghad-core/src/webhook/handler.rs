//! Axum handler for the webhook ingress.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use serde::Serialize;
use tracing::Instrument;

use super::error::WebhookError;
use super::payload::{ParsedEvent, WorkflowJobEvent, parse_event};
use super::policy::{LabelDecision, LabelPolicy, format_labels};
use super::signature::SignatureValidator;
use super::spawn::RunnerSpawner;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const EVENT_HEADER: &str = "x-github-event";
const DELIVERY_HEADER: &str = "x-github-delivery";

/// Workflow job payloads are a few KB; this bound protects against
/// oversized bodies without rejecting real deliveries.
const MAX_BODY_SIZE: usize = 256 * 1024;

#[derive(Serialize)]
struct RunnersResponse {
    message: &'static str,
    #[serde(rename = "runnerNames")]
    runner_names: Vec<String>,
}

struct WebhookState {
    validator: SignatureValidator,
    policy: LabelPolicy,
    spawner: RunnerSpawner,
}

/// The webhook ingress: owns the signature validator, the label policy and
/// the spawner, and exposes an axum router for `POST /webhook`.
pub struct WebhookHandler {
    state: Arc<WebhookState>,
}

impl WebhookHandler {
    /// Creates a handler over the shared webhook secret and the spawn seams.
    #[must_use]
    pub fn new(webhook_secret: Vec<u8>, policy: LabelPolicy, spawner: RunnerSpawner) -> Self {
        Self {
            state: Arc::new(WebhookState {
                validator: SignatureValidator::new(webhook_secret),
                policy,
                spawner,
            }),
        }
    }

    /// Returns the router for the webhook endpoint.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/webhook", post(webhook_handler))
            .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
            .with_state(Arc::clone(&self.state))
    }
}

async fn webhook_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery_id = header_value(&headers, DELIVERY_HEADER);

    let event = match admit(&state.validator, &headers, &body) {
        Ok(ParsedEvent::WorkflowJob(event)) => event,
        Ok(ParsedEvent::Ignored { event_type }) => {
            tracing::info!(delivery_id = ?delivery_id, event_type = %event_type, "received event");
            return text(StatusCode::OK, "ignored event".to_string());
        },
        Err(err) => {
            tracing::error!(delivery_id = ?delivery_id, error = %err, "failed to validate github payload");
            return text(
                StatusCode::BAD_REQUEST,
                "failed to validate github payload".to_string(),
            );
        },
    };

    // Parsing guarantees both fields are present.
    let action = event.action.clone().unwrap_or_default();
    let job = event.workflow_job.as_ref().expect("validated by parse");

    let span = tracing::info_span!(
        "workflow_job",
        delivery_id = ?delivery_id,
        action = %action,
        gh_run_id = job.run_id.unwrap_or_default(),
        gh_job_id = job.id.unwrap_or_default(),
        gh_job_name = job.name.as_deref().unwrap_or_default(),
    );

    async {
        match action.as_str() {
            "queued" => handle_queued(&state, &event).await,
            "in_progress" => {
                let queued_secs = job.queued_duration().map(|d| d.num_seconds());
                tracing::info!(duration_queued_seconds = ?queued_secs, "workflow job in progress");
                text(StatusCode::OK, "workflow job in progress event logged".to_string())
            },
            "completed" => {
                tracing::info!(
                    conclusion = job.conclusion.as_deref().unwrap_or_default(),
                    duration_in_progress_seconds =
                        ?job.in_progress_duration().map(|d| d.num_seconds()),
                    duration_total_seconds = ?job.total_duration().map(|d| d.num_seconds()),
                    "workflow job completed"
                );
                text(StatusCode::OK, "workflow job completed event logged".to_string())
            },
            other => {
                tracing::info!(action = %other, "no action taken for unhandled workflow job action type");
                text(
                    StatusCode::OK,
                    format!("no action taken for action type: {other:?}"),
                )
            },
        }
    }
    .instrument(span)
    .await
}

fn admit(
    validator: &SignatureValidator,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<ParsedEvent, WebhookError> {
    let signature = header_value(headers, SIGNATURE_HEADER)
        .ok_or(WebhookError::MissingHeader(SIGNATURE_HEADER))?;
    validator.verify(body, &signature)?;

    let event_type =
        header_value(headers, EVENT_HEADER).ok_or(WebhookError::MissingHeader(EVENT_HEADER))?;
    parse_event(&event_type, body)
}

async fn handle_queued(state: &WebhookState, event: &WorkflowJobEvent) -> Response {
    let job = event.workflow_job.as_ref().expect("validated by parse");
    tracing::info!("workflow job queued");

    let label = match state.policy.decide(&job.labels) {
        LabelDecision::Use(label) => label,
        LabelDecision::RejectMultiple => {
            tracing::warn!(labels = ?job.labels, "no action taken, only accept single label jobs");
            return text(
                StatusCode::OK,
                format!(
                    "no action taken, only accept single label jobs, got: {}",
                    format_labels(&job.labels)
                ),
            );
        },
        LabelDecision::RejectUnmatched => {
            tracing::warn!(labels = ?job.labels, "no action taken for label");
            return text(
                StatusCode::OK,
                format!("no action taken for label: {}", format_labels(&job.labels)),
            );
        },
    };

    let (installation_id, org, repo) = match event.spawn_fields() {
        Ok(fields) => fields,
        Err(err) => {
            tracing::error!(error = %err, "cannot generate JIT config due to missing event data");
            return text(
                StatusCode::BAD_REQUEST,
                "unexpected event payload structure".to_string(),
            );
        },
    };

    match state
        .spawner
        .spawn_for_job(installation_id, org, repo, &label)
        .await
    {
        Ok(runner_names) => (
            StatusCode::OK,
            Json(RunnersResponse {
                message: "runner started",
                runner_names,
            }),
        )
            .into_response(),
        Err(failure) => {
            tracing::error!(error = %failure, "failed to start runners");
            text(StatusCode::INTERNAL_SERVER_ERROR, failure.to_string())
        },
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}

fn text(status: StatusCode, body: String) -> Response {
    (status, body).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    use super::*;
    use crate::cloudbuild::{BuildError, LaunchRequest, RunnerLauncher};
    use crate::github::{GitHubError, JitProvider, JitRunnerConfig};

    const SECRET: &[u8] = b"test-github-webhook-secret";

    #[derive(Default)]
    struct MockJit {
        jit_calls: Mutex<u32>,
    }

    #[async_trait]
    impl JitProvider for MockJit {
        async fn repo_jit_config(
            &self,
            _installation_id: i64,
            _org: &str,
            _repo: &str,
            runner_name: &str,
            labels: &[String],
        ) -> Result<JitRunnerConfig, GitHubError> {
            assert!(!labels.is_empty(), "jit requests must carry a label");
            *self.jit_calls.lock().unwrap() += 1;
            Ok(JitRunnerConfig {
                runner: None,
                encoded_jit_config: format!("jit-{runner_name}"),
            })
        }

        async fn org_jit_config(
            &self,
            _installation_id: i64,
            _org: &str,
            _runner_name: &str,
            _labels: &[String],
        ) -> Result<JitRunnerConfig, GitHubError> {
            unreachable!("webhook spawning is repo scoped")
        }
    }

    #[derive(Default)]
    struct MockLauncher {
        launched: Mutex<Vec<LaunchRequest>>,
        fail_on_call: Option<usize>,
    }

    #[async_trait]
    impl RunnerLauncher for MockLauncher {
        async fn launch(&self, request: &LaunchRequest) -> Result<(), BuildError> {
            let mut launched = self.launched.lock().unwrap();
            if Some(launched.len()) == self.fail_on_call {
                return Err(BuildError::Api {
                    status: 503,
                    message: "backend unavailable".to_string(),
                });
            }
            launched.push(request.clone());
            Ok(())
        }
    }

    struct TestHarness {
        state: Arc<WebhookState>,
        jit: Arc<MockJit>,
        launcher: Arc<MockLauncher>,
    }

    fn harness(runner_label: &str, enable_self_hosted: bool, extra: u32) -> TestHarness {
        harness_with_launcher(runner_label, enable_self_hosted, extra, MockLauncher::default())
    }

    fn harness_with_launcher(
        runner_label: &str,
        enable_self_hosted: bool,
        extra: u32,
        launcher: MockLauncher,
    ) -> TestHarness {
        let jit = Arc::new(MockJit::default());
        let launcher = Arc::new(launcher);
        let state = Arc::new(WebhookState {
            validator: SignatureValidator::new(SECRET.to_vec()),
            policy: LabelPolicy {
                runner_label: runner_label.to_string(),
                enable_self_hosted_label: enable_self_hosted,
            },
            spawner: RunnerSpawner::new(jit.clone(), launcher.clone(), extra),
        });
        TestHarness {
            state,
            jit,
            launcher,
        }
    }

    fn sign(body: &[u8], secret: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
        mac.update(body);
        let digest = mac.finalize().into_bytes();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("sha256={hex}")
    }

    fn event_body(action: &str, labels: &[&str]) -> Vec<u8> {
        let started_at: Option<&str> = if action == "queued" {
            None
        } else {
            Some("2025-06-01T11:50:00Z")
        };
        let completed_at: Option<&str> = if action == "completed" {
            Some("2025-06-01T11:55:00Z")
        } else {
            None
        };
        let conclusion: Option<&str> = if action == "completed" {
            Some("success")
        } else {
            None
        };
        serde_json::to_vec(&serde_json::json!({
            "action": action,
            "workflow_job": {
                "id": 789,
                "run_id": 456,
                "name": "build-job",
                "labels": labels,
                "created_at": "2025-06-01T11:45:00Z",
                "started_at": started_at,
                "completed_at": completed_at,
                "conclusion": conclusion
            },
            "installation": {"id": 123},
            "organization": {"login": "acme"},
            "repository": {"name": "svc"}
        }))
        .unwrap()
    }

    fn headers_for(body: &[u8], event_type: &str, secret: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, sign(body, secret).parse().unwrap());
        headers.insert(EVENT_HEADER, event_type.parse().unwrap());
        headers.insert(DELIVERY_HEADER, "delivery-id".parse().unwrap());
        headers
    }

    async fn call(harness: &TestHarness, headers: HeaderMap, body: Vec<u8>) -> (StatusCode, String) {
        let response = webhook_handler(
            State(Arc::clone(&harness.state)),
            headers,
            Bytes::from(body),
        )
        .await;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn queued_event_spawns_one_runner() {
        let h = harness("self-hosted", false, 0);
        let body = event_body("queued", &["self-hosted"]);
        let headers = headers_for(&body, "workflow_job", SECRET);

        let (status, body) = call(&h, headers, body).await;
        assert_eq!(status, StatusCode::OK);

        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["message"], "runner started");
        assert_eq!(parsed["runnerNames"].as_array().unwrap().len(), 1);

        assert_eq!(*h.jit.jit_calls.lock().unwrap(), 1);
        let launched = h.launcher.launched.lock().unwrap();
        assert_eq!(launched.len(), 1);
        assert_eq!(
            launched[0].jit_config,
            format!("jit-{}", launched[0].runner_name)
        );
    }

    #[tokio::test]
    async fn extra_runner_count_spawns_more() {
        let h = harness("self-hosted", false, 2);
        let body = event_body("queued", &["self-hosted"]);
        let headers = headers_for(&body, "workflow_job", SECRET);

        let (status, body) = call(&h, headers, body).await;
        assert_eq!(status, StatusCode::OK);

        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        let names = parsed["runnerNames"].as_array().unwrap();
        assert_eq!(names.len(), 3);
        let mut distinct: Vec<&str> = names.iter().map(|n| n.as_str().unwrap()).collect();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(distinct.len(), 3);
    }

    #[tokio::test]
    async fn multi_label_jobs_are_rejected() {
        // Strict even with the compatibility flag enabled.
        let h = harness("custom-label", true, 0);
        let body = event_body("queued", &["self-hosted", "gpu"]);
        let headers = headers_for(&body, "workflow_job", SECRET);

        let (status, body) = call(&h, headers, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            "no action taken, only accept single label jobs, got: [self-hosted gpu]"
        );
        assert!(h.launcher.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unmatched_label_is_acknowledged_without_spawn() {
        let h = harness("self-hosted", false, 0);
        let body = event_body("queued", &["other-label"]);
        let headers = headers_for(&body, "workflow_job", SECRET);

        let (status, body) = call(&h, headers, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "no action taken for label: [other-label]");
        assert!(h.launcher.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ubuntu_latest_alias_spawns_with_configured_label() {
        let h = harness("custom-label", false, 0);
        let body = event_body("queued", &["sh-ubuntu-latest"]);
        let headers = headers_for(&body, "workflow_job", SECRET);

        let (status, _) = call(&h, headers, body).await;
        assert_eq!(status, StatusCode::OK);
        let launched = h.launcher.launched.lock().unwrap();
        assert_eq!(launched[0].label, "custom-label");
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_without_side_effects() {
        let h = harness("self-hosted", false, 0);
        let body = event_body("queued", &["self-hosted"]);
        let headers = headers_for(&body, "workflow_job", b"wrong-secret");

        let (status, body) = call(&h, headers, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "failed to validate github payload");
        assert!(h.launcher.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_signature_header_is_rejected() {
        let h = harness("self-hosted", false, 0);
        let body = event_body("queued", &["self-hosted"]);
        let mut headers = HeaderMap::new();
        headers.insert(EVENT_HEADER, "workflow_job".parse().unwrap());

        let (status, _) = call(&h, headers, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn installation_events_are_ignored() {
        let h = harness("self-hosted", false, 0);
        let body = br#"{"action":"created"}"#.to_vec();
        let headers = headers_for(&body, "installation", SECRET);

        let (status, body) = call(&h, headers, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ignored event");
    }

    #[tokio::test]
    async fn in_progress_and_completed_are_logged_only() {
        let h = harness("self-hosted", false, 0);

        let body = event_body("in_progress", &["self-hosted"]);
        let headers = headers_for(&body, "workflow_job", SECRET);
        let (status, text) = call(&h, headers, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "workflow job in progress event logged");

        let body = event_body("completed", &["self-hosted"]);
        let headers = headers_for(&body, "workflow_job", SECRET);
        let (status, text) = call(&h, headers, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "workflow job completed event logged");

        assert!(h.launcher.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unhandled_action_is_acknowledged() {
        let h = harness("self-hosted", false, 0);
        let body = event_body("waiting", &["self-hosted"]);
        let headers = headers_for(&body, "workflow_job", SECRET);

        let (status, text) = call(&h, headers, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "no action taken for action type: \"waiting\"");
    }

    #[tokio::test]
    async fn missing_spawn_fields_is_bad_request() {
        let h = harness("self-hosted", false, 0);
        let body = serde_json::to_vec(&serde_json::json!({
            "action": "queued",
            "workflow_job": {"labels": ["self-hosted"]}
        }))
        .unwrap();
        let headers = headers_for(&body, "workflow_job", SECRET);

        let (status, text) = call(&h, headers, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(text, "unexpected event payload structure");
        assert!(h.launcher.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn downstream_failure_returns_500_with_started_runners() {
        let h = harness_with_launcher(
            "self-hosted",
            false,
            2,
            MockLauncher {
                fail_on_call: Some(1),
                ..MockLauncher::default()
            },
        );
        let body = event_body("queued", &["self-hosted"]);
        let headers = headers_for(&body, "workflow_job", SECRET);

        let (status, text) = call(&h, headers, body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        // The one runner that started is listed for external reconciliation.
        let launched = h.launcher.launched.lock().unwrap();
        assert_eq!(launched.len(), 1);
        assert!(text.contains(&launched[0].runner_name));
        assert!(text.contains("failed on runner"));
    }

    #[test]
    fn router_builds() {
        let jit: Arc<dyn JitProvider> = Arc::new(MockJit::default());
        let launcher: Arc<dyn RunnerLauncher> = Arc::new(MockLauncher::default());
        let handler = WebhookHandler::new(
            SECRET.to_vec(),
            LabelPolicy {
                runner_label: "self-hosted".to_string(),
                enable_self_hosted_label: false,
            },
            RunnerSpawner::new(jit, launcher, 0),
        );
        let _router = handler.router();
    }
}
