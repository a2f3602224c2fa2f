//! Axum handler for `POST /jit-config`.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use serde::Deserialize;
use uuid::Uuid;

use super::allowlist::Allowlist;
use super::iap::IapVerifier;
use crate::github::JitProvider;

const IAP_ASSERTION_HEADER: &str = "x-goog-iap-jwt-assertion";

#[derive(Debug, Deserialize)]
struct JitConfigRequest {
    #[serde(default)]
    owner: String,
    #[serde(default)]
    repo: String,
    #[serde(default)]
    labels: Vec<String>,
}

struct JitConfigState {
    verifier: Arc<dyn IapVerifier>,
    audience: String,
    allowlist: Allowlist,
    jit: Arc<dyn JitProvider>,
    installation_id: i64,
}

/// The on-demand JIT endpoint: IAP assertion, then allowlist, then mint.
pub struct JitConfigHandler {
    state: Arc<JitConfigState>,
}

impl JitConfigHandler {
    /// Creates a handler over the verification and minting seams.
    #[must_use]
    pub fn new(
        verifier: Arc<dyn IapVerifier>,
        audience: impl Into<String>,
        allowlist: Allowlist,
        jit: Arc<dyn JitProvider>,
        installation_id: i64,
    ) -> Self {
        Self {
            state: Arc::new(JitConfigState {
                verifier,
                audience: audience.into(),
                allowlist,
                jit,
                installation_id,
            }),
        }
    }

    /// Returns the router for the JIT config endpoint.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/jit-config", post(jit_config_handler))
            .with_state(Arc::clone(&self.state))
    }
}

async fn jit_config_handler(
    State(state): State<Arc<JitConfigState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // 1. IAP assertion. Absence and invalidity are indistinguishable to the
    //    caller.
    let assertion = headers
        .get(IAP_ASSERTION_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if assertion.is_empty() {
        tracing::warn!("jit-config request without IAP assertion");
        return text(StatusCode::FORBIDDEN, "invalid IAP token");
    }
    if let Err(err) = state.verifier.verify(assertion, &state.audience).await {
        tracing::warn!(error = %err, "rejected IAP assertion");
        return text(StatusCode::FORBIDDEN, "invalid IAP token");
    }

    // 2. Body shape.
    let request: JitConfigRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(error = %err, "unparseable jit-config request");
            return text(StatusCode::BAD_REQUEST, "invalid request body");
        },
    };
    if request.owner.is_empty() || request.repo.is_empty() || request.labels.is_empty() {
        return text(
            StatusCode::BAD_REQUEST,
            "owner, repo, and labels are required",
        );
    }

    // 3. Allowlist.
    if !state
        .allowlist
        .permits(&request.owner, &request.repo, &request.labels)
    {
        tracing::warn!(
            owner = %request.owner,
            repo = %request.repo,
            labels = ?request.labels,
            "jit-config request denied by allowlist"
        );
        return text(StatusCode::FORBIDDEN, "request denied by allowlist");
    }

    // 4. Mint.
    let runner_name = Uuid::new_v4().to_string();
    match state
        .jit
        .repo_jit_config(
            state.installation_id,
            &request.owner,
            &request.repo,
            &runner_name,
            &request.labels,
        )
        .await
    {
        Ok(config) => {
            tracing::info!(
                owner = %request.owner,
                repo = %request.repo,
                runner_name = %runner_name,
                "jit config generated"
            );
            (StatusCode::OK, Json(config)).into_response()
        },
        Err(err) => {
            tracing::error!(error = %err, "failed to generate JIT config");
            text(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to generate JIT config",
            )
        },
    }
}

fn text(status: StatusCode, body: &'static str) -> Response {
    (status, body).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::github::{GitHubError, JitRunnerConfig};
    use crate::jitconfig::iap::IapError;

    const VALID_TOKEN: &str = "valid-token";
    const AUDIENCE: &str = "valid-audience";

    struct MockVerifier;

    #[async_trait]
    impl IapVerifier for MockVerifier {
        async fn verify(&self, assertion: &str, audience: &str) -> Result<(), IapError> {
            if assertion == VALID_TOKEN && audience == AUDIENCE {
                Ok(())
            } else {
                Err(IapError::Invalid("bad token".to_string()))
            }
        }
    }

    #[derive(Default)]
    struct MockJit {
        mints: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl JitProvider for MockJit {
        async fn repo_jit_config(
            &self,
            installation_id: i64,
            _org: &str,
            _repo: &str,
            _runner_name: &str,
            _labels: &[String],
        ) -> Result<JitRunnerConfig, GitHubError> {
            assert_eq!(installation_id, 123);
            self.mints.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GitHubError::Api {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(JitRunnerConfig {
                runner: None,
                encoded_jit_config: "jit".to_string(),
            })
        }

        async fn org_jit_config(
            &self,
            _installation_id: i64,
            _org: &str,
            _runner_name: &str,
            _labels: &[String],
        ) -> Result<JitRunnerConfig, GitHubError> {
            unreachable!("on-demand minting is repo scoped")
        }
    }

    struct Harness {
        state: Arc<JitConfigState>,
        jit: Arc<MockJit>,
    }

    fn harness(allowlist_json: &str, jit: MockJit) -> Harness {
        let jit = Arc::new(jit);
        let state = Arc::new(JitConfigState {
            verifier: Arc::new(MockVerifier),
            audience: AUDIENCE.to_string(),
            allowlist: Allowlist::from_json(allowlist_json).unwrap(),
            jit: jit.clone(),
            installation_id: 123,
        });
        Harness { state, jit }
    }

    fn request_body(owner: &str, repo: &str, labels: &[&str]) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "owner": owner,
            "repo": repo,
            "labels": labels,
        }))
        .unwrap()
    }

    async fn call(h: &Harness, token: Option<&str>, body: Vec<u8>) -> (StatusCode, String) {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            headers.insert(IAP_ASSERTION_HEADER, token.parse().unwrap());
        }
        let response =
            jit_config_handler(State(Arc::clone(&h.state)), headers, Bytes::from(body)).await;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn missing_token_is_forbidden() {
        let h = harness(r#"{"owner":{"repo":["label"]}}"#, MockJit::default());
        let (status, body) = call(&h, None, request_body("owner", "repo", &["label"])).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "invalid IAP token");
        assert_eq!(h.jit.mints.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_token_is_forbidden() {
        let h = harness(r#"{"owner":{"repo":["label"]}}"#, MockJit::default());
        let (status, body) =
            call(&h, Some("invalid"), request_body("owner", "repo", &["label"])).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "invalid IAP token");
        assert_eq!(h.jit.mints.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn allowlist_denial_is_forbidden_without_mint() {
        let h = harness(r#"{"owner":{"repo":["other-label"]}}"#, MockJit::default());
        let (status, body) =
            call(&h, Some(VALID_TOKEN), request_body("owner", "repo", &["label"])).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "request denied by allowlist");
        assert_eq!(h.jit.mints.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_fields_are_bad_request() {
        let h = harness(r#"{"owner":{"repo":["label"]}}"#, MockJit::default());
        for body in [
            request_body("", "repo", &["label"]),
            request_body("owner", "", &["label"]),
            request_body("owner", "repo", &[]),
        ] {
            let (status, _) = call(&h, Some(VALID_TOKEN), body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        assert_eq!(h.jit.mints.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparseable_body_is_bad_request() {
        let h = harness(r#"{"owner":{"repo":["label"]}}"#, MockJit::default());
        let (status, _) = call(&h, Some(VALID_TOKEN), b"not json".to_vec()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn success_returns_jit_document() {
        let h = harness(r#"{"owner":{"repo":["label"]}}"#, MockJit::default());
        let (status, body) =
            call(&h, Some(VALID_TOKEN), request_body("owner", "repo", &["label"])).await;
        assert_eq!(status, StatusCode::OK);

        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["encoded_jit_config"], "jit");
        assert_eq!(h.jit.mints.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn downstream_failure_is_500() {
        let h = harness(
            r#"{"owner":{"repo":["label"]}}"#,
            MockJit {
                fail: true,
                ..MockJit::default()
            },
        );
        let (status, body) =
            call(&h, Some(VALID_TOKEN), request_body("owner", "repo", &["label"])).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "failed to generate JIT config");
    }
}
