//! Serial runner spawning for accepted queued events.

use std::sync::Arc;

use uuid::Uuid;

use crate::cloudbuild::{BuildError, LaunchRequest, RunnerLauncher};
use crate::github::{GitHubError, JitProvider};

/// A spawn loop failure, carrying the runners that were already started so
/// the caller can reconcile externally.
#[derive(Debug)]
pub struct SpawnFailure {
    /// Runner ids that were fully started before the failure.
    pub started: Vec<String>,

    /// The runner id that failed.
    pub failed_runner: String,

    /// What went wrong.
    pub cause: SpawnFailureCause,
}

#[derive(Debug)]
pub enum SpawnFailureCause {
    /// Minting the JIT configuration failed.
    Jit(GitHubError),

    /// Submitting the build failed.
    Launch(BuildError),
}

impl std::fmt::Display for SpawnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cause: &dyn std::fmt::Display = match &self.cause {
            SpawnFailureCause::Jit(err) => err,
            SpawnFailureCause::Launch(err) => err,
        };
        write!(
            f,
            "failed on runner {}: {cause}. started runners: [{}]",
            self.failed_runner,
            self.started.join(" ")
        )
    }
}

impl std::error::Error for SpawnFailure {}

/// Spawns `1 + extra_runner_count` runners per accepted event.
///
/// Runners are spawned serially: the response's runner list preserves spawn
/// order, and the first failure stops the loop. Over-provisioning is
/// intentional; nothing guarantees the job lands on one of these runners.
pub struct RunnerSpawner {
    jit: Arc<dyn JitProvider>,
    launcher: Arc<dyn RunnerLauncher>,
    extra_runner_count: u32,
}

impl RunnerSpawner {
    /// Creates a spawner over the given seams.
    #[must_use]
    pub fn new(
        jit: Arc<dyn JitProvider>,
        launcher: Arc<dyn RunnerLauncher>,
        extra_runner_count: u32,
    ) -> Self {
        Self {
            jit,
            launcher,
            extra_runner_count,
        }
    }

    /// Mints a JIT config and submits a build for each runner, serially.
    ///
    /// # Errors
    ///
    /// Returns the first failure together with the runners already started.
    pub async fn spawn_for_job(
        &self,
        installation_id: i64,
        org: &str,
        repo: &str,
        label: &str,
    ) -> Result<Vec<String>, SpawnFailure> {
        let mut started: Vec<String> = Vec::new();

        for i in 0..=self.extra_runner_count {
            let runner_id = Uuid::new_v4().to_string();
            if i > 0 {
                tracing::info!(runner_id = %runner_id, "spawning extra runner");
            }

            let labels = vec![label.to_string()];
            let jit = match self
                .jit
                .repo_jit_config(installation_id, org, repo, &runner_id, &labels)
                .await
            {
                Ok(jit) => jit,
                Err(err) => {
                    tracing::error!(runner_id = %runner_id, error = %err, "failed to generate JIT config");
                    return Err(SpawnFailure {
                        started,
                        failed_runner: runner_id,
                        cause: SpawnFailureCause::Jit(err),
                    });
                },
            };

            let request = LaunchRequest {
                runner_name: runner_id.clone(),
                jit_config: jit.encoded_jit_config,
                label: label.to_string(),
            };
            if let Err(err) = self.launcher.launch(&request).await {
                tracing::error!(runner_id = %runner_id, error = %err, "failed to submit runner build");
                return Err(SpawnFailure {
                    started,
                    failed_runner: runner_id,
                    cause: SpawnFailureCause::Launch(err),
                });
            }

            tracing::info!(runner_id = %runner_id, label = %label, "runner started");
            started.push(runner_id);
        }

        Ok(started)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::github::JitRunnerConfig;

    #[derive(Default)]
    struct MockJit {
        calls: AtomicU32,
        fail_on_call: Option<u32>,
    }

    #[async_trait]
    impl JitProvider for MockJit {
        async fn repo_jit_config(
            &self,
            _installation_id: i64,
            _org: &str,
            _repo: &str,
            runner_name: &str,
            _labels: &[String],
        ) -> Result<JitRunnerConfig, GitHubError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(call) == self.fail_on_call {
                return Err(GitHubError::Api {
                    status: 404,
                    message: "missing installation".to_string(),
                });
            }
            Ok(JitRunnerConfig {
                runner: None,
                encoded_jit_config: format!("jit-for-{runner_name}"),
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
                    status: 500,
                    message: "backend exploded".to_string(),
                });
            }
            launched.push(request.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn spawns_one_runner_by_default() {
        let jit = Arc::new(MockJit::default());
        let launcher = Arc::new(MockLauncher::default());
        let spawner = RunnerSpawner::new(jit.clone(), launcher.clone(), 0);

        let names = spawner
            .spawn_for_job(123, "acme", "svc", "self-hosted")
            .await
            .unwrap();

        assert_eq!(names.len(), 1);
        let launched = launcher.launched.lock().unwrap();
        assert_eq!(launched.len(), 1);
        assert_eq!(launched[0].runner_name, names[0]);
        assert_eq!(launched[0].label, "self-hosted");
        assert_eq!(launched[0].jit_config, format!("jit-for-{}", names[0]));
    }

    #[tokio::test]
    async fn extra_runner_count_adds_spawns() {
        let jit = Arc::new(MockJit::default());
        let launcher = Arc::new(MockLauncher::default());
        let spawner = RunnerSpawner::new(jit, launcher.clone(), 2);

        let names = spawner
            .spawn_for_job(123, "acme", "svc", "self-hosted")
            .await
            .unwrap();

        assert_eq!(names.len(), 3);
        // All ids are distinct.
        let mut deduped = names.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), 3);
        assert_eq!(launcher.launched.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn jit_failure_stops_the_loop() {
        let jit = Arc::new(MockJit {
            fail_on_call: Some(1),
            ..MockJit::default()
        });
        let launcher = Arc::new(MockLauncher::default());
        let spawner = RunnerSpawner::new(jit, launcher.clone(), 2);

        let failure = spawner
            .spawn_for_job(123, "acme", "svc", "self-hosted")
            .await
            .unwrap_err();

        assert_eq!(failure.started.len(), 1);
        assert!(matches!(failure.cause, SpawnFailureCause::Jit(_)));
        // Only the first runner reached the launcher.
        assert_eq!(launcher.launched.lock().unwrap().len(), 1);

        let message = failure.to_string();
        assert!(message.contains(&failure.started[0]));
        assert!(message.contains("failed on runner"));
    }

    #[tokio::test]
    async fn launch_failure_reports_started_runners() {
        let jit = Arc::new(MockJit::default());
        let launcher = Arc::new(MockLauncher {
            fail_on_call: Some(2),
            ..MockLauncher::default()
        });
        let spawner = RunnerSpawner::new(jit, launcher.clone(), 3);

        let failure = spawner
            .spawn_for_job(123, "acme", "svc", "self-hosted")
            .await
            .unwrap_err();

        assert_eq!(failure.started.len(), 2);
        assert!(matches!(failure.cause, SpawnFailureCause::Launch(_)));
    }
}
