//! The shared runner-class registry.
//!
//! The registry is the only externally mutated shared state in the system.
//! Writes happen exclusively through [`ReconcilePlan`]s executed as one
//! atomic multi-command transaction, never as partial updates. The dispatch
//! plane performs no registry writes; the registry is the product the
//! discovery plane publishes for downstream routing.

mod memory;
mod redis_store;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryRegistry;
pub use redis_store::RedisRegistry;

/// A reconcile transaction as a value: all deletions, then all writes.
///
/// Sets are kept in ascending key order; [`ReconcilePlan::set`] maintains
/// the invariant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Keys to delete, typically everything the prefix scan returned.
    pub dels: Vec<String>,

    /// `(key, value)` pairs to write, in ascending key order.
    pub sets: Vec<(String, String)>,
}

impl ReconcilePlan {
    /// Returns `true` when the plan would touch nothing; empty plans are
    /// never submitted to the store.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dels.is_empty() && self.sets.is_empty()
    }

    /// Appends a write, keeping sets sorted by key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        let position = self
            .sets
            .partition_point(|(existing, _)| existing.as_str() < key.as_str());
        self.sets.insert(position, (key, value));
    }
}

/// Errors produced by the registry store.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The store is unreachable.
    #[error("registry connection failure: {0}")]
    Connection(String),

    /// A command or transaction failed.
    #[error("registry command failure: {0}")]
    Command(String),
}

/// The key/value store holding the class-to-pools mapping.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Returns every key matching `pattern` (a glob such as `default:*`).
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, RegistryError>;

    /// Executes `plan` atomically: all deletions and writes commit
    /// together or not at all.
    async fn execute(&self, plan: &ReconcilePlan) -> Result<(), RegistryError>;
}
