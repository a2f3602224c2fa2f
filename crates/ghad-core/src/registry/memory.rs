//! In-memory registry store for tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;

use super::{ReconcilePlan, RegistryError, RegistryStore};

/// A [`RegistryStore`] over a map, with failure injection. Glob support is
/// limited to the `<prefix>*` patterns the reconciler emits.
#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<BTreeMap<String, String>>,
    executed: AtomicU32,
    fail_scan: AtomicBool,
    fail_execute: AtomicBool,
}

impl MemoryRegistry {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a key, bypassing the transaction path.
    pub fn seed(&self, key: impl Into<String>, value: impl Into<String>) {
        self.state.lock().unwrap().insert(key.into(), value.into());
    }

    /// Snapshot of the current contents.
    #[must_use]
    pub fn dump(&self) -> BTreeMap<String, String> {
        self.state.lock().unwrap().clone()
    }

    /// Number of executed (non-empty) transactions.
    #[must_use]
    pub fn executed_transactions(&self) -> u32 {
        self.executed.load(Ordering::SeqCst)
    }

    /// Makes subsequent scans fail.
    pub fn fail_scans(&self) {
        self.fail_scan.store(true, Ordering::SeqCst);
    }

    /// Makes subsequent transactions fail.
    pub fn fail_executes(&self) {
        self.fail_execute.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistry {
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, RegistryError> {
        if self.fail_scan.load(Ordering::SeqCst) {
            return Err(RegistryError::Command("injected scan failure".to_string()));
        }

        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        Ok(self
            .state
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn execute(&self, plan: &ReconcilePlan) -> Result<(), RegistryError> {
        if self.fail_execute.load(Ordering::SeqCst) {
            return Err(RegistryError::Command(
                "injected transaction failure".to_string(),
            ));
        }

        let mut state = self.state.lock().unwrap();
        for key in &plan.dels {
            state.remove(key);
        }
        for (key, value) in &plan.sets {
            state.insert(key.clone(), value.clone());
        }
        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
