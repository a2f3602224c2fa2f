//! Validation of discovered projects against the required labels.

use crate::gcp::ProjectInfo;

const RUNNER_TYPE_LABEL: &str = "runner-type";
const RUNNER_LABEL_LABEL: &str = "runner-label";
const RUNNER_LOCATION_LABEL: &str = "runner-location";

/// A project admitted into the discovery cycle: all three required labels
/// present and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerProject {
    pub project_id: String,
    pub runner_type: String,
    pub runner_label: String,
    pub location: String,
}

impl RunnerProject {
    /// Classifies `project`, returning the labels that are missing or empty
    /// when it cannot participate.
    ///
    /// # Errors
    ///
    /// The list of offending label keys, for the skip warning.
    pub fn from_project(project: &ProjectInfo) -> Result<Self, Vec<&'static str>> {
        let mut missing = Vec::new();
        let mut get = |name: &'static str| match project.labels.get(name) {
            Some(value) if !value.is_empty() => value.clone(),
            _ => {
                missing.push(name);
                String::new()
            },
        };

        let runner_type = get(RUNNER_TYPE_LABEL);
        let runner_label = get(RUNNER_LABEL_LABEL);
        let location = get(RUNNER_LOCATION_LABEL);

        if !missing.is_empty() {
            return Err(missing);
        }

        Ok(Self {
            project_id: project.project_id.clone(),
            runner_type,
            runner_label,
            location,
        })
    }

    /// The runner class key this project's pools group under. Derived from
    /// the project's labels, never from workflow labels or machine types.
    #[must_use]
    pub fn class_key(&self) -> String {
        format!("{}:{}", self.runner_type, self.runner_label)
    }
}
