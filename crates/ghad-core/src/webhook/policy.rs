//! Single-label admission policy for queued jobs.

/// The legacy runner label accepted while installations migrate off it.
pub const SELF_HOSTED_LABEL: &str = "self-hosted";

/// A fixed alias that always resolves to the configured runner label.
pub const SELF_HOSTED_UBUNTU_LATEST_LABEL: &str = "sh-ubuntu-latest";

/// Label admission configuration.
#[derive(Debug, Clone)]
pub struct LabelPolicy {
    /// The single, exact label the dispatcher processes.
    pub runner_label: String,

    /// Also accept the bare `self-hosted` label. Temporary until org
    /// registration is enabled.
    pub enable_self_hosted_label: bool,
}

/// Outcome of applying the policy to a job's label list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelDecision {
    /// Spawn with this label.
    Use(String),

    /// The job has zero or multiple labels. Never spawns, even when the
    /// compatibility flag is on.
    RejectMultiple,

    /// The single label matches nothing the dispatcher serves.
    RejectUnmatched,
}

impl LabelPolicy {
    /// Applies the policy to a queued job's labels.
    #[must_use]
    pub fn decide(&self, labels: &[String]) -> LabelDecision {
        if labels.len() != 1 {
            return LabelDecision::RejectMultiple;
        }

        let incoming = labels[0].as_str();
        if incoming == self.runner_label || incoming == SELF_HOSTED_UBUNTU_LATEST_LABEL {
            return LabelDecision::Use(self.runner_label.clone());
        }
        if self.enable_self_hosted_label && incoming == SELF_HOSTED_LABEL {
            return LabelDecision::Use(SELF_HOSTED_LABEL.to_string());
        }

        LabelDecision::RejectUnmatched
    }
}

/// Formats a label list the way it appears in response messages: `[a b]`.
#[must_use]
pub fn format_labels(labels: &[String]) -> String {
    format!("[{}]", labels.join(" "))
}
