//! The `owner -> repo -> labels` allowlist with `"*"` wildcards.

use std::collections::BTreeMap;

use serde::Deserialize;

const WILDCARD: &str = "*";

/// Three-level allowlist controlling who may request JIT configurations.
///
/// `"*"` acts as a wildcard at the owner and repo levels and inside a label
/// list. Lookup is strictly two-step: the owner entry (exact, then `"*"`) is
/// resolved first, and the repo entry is resolved inside it; a wildcard
/// owner entry is never consulted for an owner that has an exact entry.
/// An empty allowlist denies everything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Allowlist(BTreeMap<String, BTreeMap<String, Vec<String>>>);

impl Allowlist {
    /// Parses the allowlist from its JSON configuration form.
    ///
    /// # Errors
    ///
    /// Returns the JSON error unchanged.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Returns `true` when no entries are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` when `(owner, repo)` may request every label in
    /// `labels`.
    #[must_use]
    pub fn permits(&self, owner: &str, repo: &str, labels: &[String]) -> bool {
        let Some(repos) = self.0.get(owner).or_else(|| self.0.get(WILDCARD)) else {
            return false;
        };
        let Some(allowed) = repos.get(repo).or_else(|| repos.get(WILDCARD)) else {
            return false;
        };

        if allowed.iter().any(|label| label == WILDCARD) {
            return true;
        }
        labels.iter().all(|label| allowed.contains(label))
    }
}
