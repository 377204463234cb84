//! Crash-safe agent checkpoints stored under `checkpoints/{platform}.json`.

use std::sync::Arc;
use tickerscan_core::{load_json, save_json, AgentProgress, KvStore, Platform, StoreResult};

/// Reads and writes [`AgentProgress`] checkpoints.
#[derive(Clone)]
pub struct CheckpointStore {
    store: Arc<dyn KvStore>,
}

impl CheckpointStore {
    /// Create a checkpoint store backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn key(platform: &Platform) -> String {
        format!("checkpoints/{platform}.json")
    }

    /// Load the checkpoint for `platform`, `None` if there is none.
    pub fn load(&self, platform: &Platform) -> StoreResult<Option<AgentProgress>> {
        load_json(self.store.as_ref(), &Self::key(platform))
    }

    /// Replace the checkpoint for `progress.platform`.
    pub fn save(&self, progress: &AgentProgress) -> StoreResult<()> {
        save_json(self.store.as_ref(), &Self::key(&progress.platform), progress)
    }

    /// Remove the checkpoint. Returns whether one existed.
    pub fn delete(&self, platform: &Platform) -> StoreResult<bool> {
        self.store.delete(&Self::key(platform))
    }

    /// Whether a checkpoint exists for `platform`.
    pub fn exists(&self, platform: &Platform) -> StoreResult<bool> {
        self.store.exists(&Self::key(platform))
    }
}
