//! Concurrent runs keyed by run id.

use super::RunContext;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Shared handle to a registered run.
pub type RunHandle = Arc<Mutex<RunContext>>;

/// Registry of in-flight runs.
///
/// Each run's context sits behind its own lock, so runs never contend.
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: DashMap<String, RunHandle>,
}

impl RunRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a run. Returns `None` if the run id is already in flight.
    pub fn begin(&self, context: RunContext) -> Option<RunHandle> {
        match self.runs.entry(context.run_id().to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                debug!(run_id = %context.run_id(), "Run registered");
                let handle = Arc::new(Mutex::new(context));
                slot.insert(Arc::clone(&handle));
                Some(handle)
            }
        }
    }

    /// Returns the handle for an in-flight run.
    #[must_use]
    pub fn get(&self, run_id: &str) -> Option<RunHandle> {
        self.runs.get(run_id).map(|h| Arc::clone(h.value()))
    }

    /// Returns true if a run is in flight.
    #[must_use]
    pub fn contains(&self, run_id: &str) -> bool {
        self.runs.contains_key(run_id)
    }

    /// Removes a run and drops its breaker state.
    pub async fn end_run(&self, run_id: &str) -> Option<RunHandle> {
        let (_, handle) = self.runs.remove(run_id)?;
        handle.lock().await.finish();
        debug!(run_id, "Run ended");
        Some(handle)
    }

    /// Returns the ids of in-flight runs, sorted.
    #[must_use]
    pub fn run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runs.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Returns the number of in-flight runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Returns true if no run is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
