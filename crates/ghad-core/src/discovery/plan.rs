//! Grouping of observed pools into a reconcile plan.

use std::collections::{BTreeMap, BTreeSet};

use crate::registry::ReconcilePlan;

/// Accumulates `(class key, pool name)` observations for one cycle.
///
/// Both levels are ordered sets, so serialization is deterministic
/// regardless of discovery order: pool lists are ascending, and `SET`
/// commands are emitted in ascending key order. The registry key is the
/// class key itself; the configured prefix only scopes the stale-key scan.
#[derive(Debug, Default)]
pub struct PoolObservations {
    by_class: BTreeMap<String, BTreeSet<String>>,
}

impl PoolObservations {
    /// Creates an empty observation set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one pool under a class key.
    pub fn record(&mut self, class_key: impl Into<String>, pool_name: impl Into<String>) {
        self.by_class
            .entry(class_key.into())
            .or_default()
            .insert(pool_name.into());
    }

    /// Returns `true` when nothing was observed this cycle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_class.is_empty()
    }

    /// Number of distinct classes observed.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.by_class.len()
    }

    /// Builds the transaction: delete everything the scan returned, then
    /// write each observed class key with a JSON array of its sorted pool
    /// names.
    #[must_use]
    pub fn into_plan(self, stale_keys: Vec<String>) -> ReconcilePlan {
        let mut plan = ReconcilePlan {
            dels: stale_keys,
            sets: Vec::with_capacity(self.by_class.len()),
        };

        for (class_key, pools) in self.by_class {
            let names: Vec<&String> = pools.iter().collect();
            // Serializing a vector of strings cannot fail.
            let value = serde_json::to_string(&names).expect("pool names serialize");
            plan.set(class_key, value);
        }

        plan
    }
}
