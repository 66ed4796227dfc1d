//! Checkpoint persistence protocol and the in-memory store.

use super::Checkpoint;
use crate::errors::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Protocol for checkpoint storage backends.
///
/// `load` never fails: a missing or unusable checkpoint is reported as
/// `None` so the run starts fresh.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persists a checkpoint, replacing any previous one for its run.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Loads the checkpoint for a run.
    async fn load(&self, run_id: &str) -> Option<Checkpoint>;

    /// Deletes the checkpoint for a run. Returns true if one existed.
    async fn delete(&self, run_id: &str) -> Result<bool>;

    /// Lists runs that have a checkpoint.
    async fn list_runs(&self) -> Result<Vec<String>>;
}

/// In-memory checkpoint store.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    /// Creates a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored checkpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.lock().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.lock().is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.checkpoints
            .lock()
            .insert(checkpoint.run_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Option<Checkpoint> {
        self.checkpoints.lock().get(run_id).cloned()
    }

    async fn delete(&self, run_id: &str) -> Result<bool> {
        Ok(self.checkpoints.lock().remove(run_id).is_some())
    }

    async fn list_runs(&self) -> Result<Vec<String>> {
        let mut runs: Vec<_> = self.checkpoints.lock().keys().cloned().collect();
        runs.sort();
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Payload, StageResult};

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.is_empty());
        assert!(store.load("run-1").await.is_none());

        let checkpoint = Checkpoint::begin("run-1", 1)
            .record(StageResult::success("plan", Payload::new(), 0.1, 0))
            .build();
        store.save(&checkpoint).await.unwrap();

        assert_eq!(store.load("run-1").await, Some(checkpoint));
        assert_eq!(store.list_runs().await.unwrap(), vec!["run-1".to_string()]);
        assert!(store.delete("run-1").await.unwrap());
        assert!(!store.delete("run-1").await.unwrap());
    }

    #[test]
    fn test_save_overwrites_previous_checkpoint() {
        let store = InMemoryCheckpointStore::new();
        tokio_test::block_on(async {
            let first = Checkpoint::begin("run-2", 2).build();
            let second = Checkpoint::begin("run-2", 2)
                .record(StageResult::success("plan", Payload::new(), 0.1, 0))
                .build();
            store.save(&first).await.unwrap();
            store.save(&second).await.unwrap();

            assert_eq!(store.len(), 1);
            assert_eq!(store.load("run-2").await, Some(second));
        });
    }
}
