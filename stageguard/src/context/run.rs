//! The per-run dependency container.

use crate::breaker::{BreakerConfig, BreakerRegistry};
use crate::checkpoint::{Checkpoint, CheckpointBuilder};
use crate::stack::StateStack;
use crate::utils::{Clock, SystemClock, Timestamp};
use std::sync::Arc;

/// Mutable state owned by one run.
#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    /// Execution history of the run.
    pub stack: StateStack,
    /// Circuit breakers for the run's stages.
    pub breakers: BreakerRegistry,
    /// Checkpoint accumulated so far.
    pub checkpoint: CheckpointBuilder,
    resume_from: Option<Checkpoint>,
    started_at: Timestamp,
}

impl RunContext {
    /// Creates a fresh context.
    #[must_use]
    pub fn new(run_id: impl Into<String>, total_stages: usize, breaker: BreakerConfig) -> Self {
        Self::with_clock(run_id, total_stages, breaker, Arc::new(SystemClock))
    }

    /// Creates a fresh context whose breakers use `clock`.
    #[must_use]
    pub fn with_clock(
        run_id: impl Into<String>,
        total_stages: usize,
        breaker: BreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let run_id = run_id.into();
        let started_at = clock.now();
        Self {
            stack: StateStack::new(),
            breakers: BreakerRegistry::with_clock(run_id.clone(), breaker, clock),
            checkpoint: CheckpointBuilder::new(run_id.clone(), total_stages),
            resume_from: None,
            started_at,
            run_id,
        }
    }

    /// Marks the context as resuming from an earlier checkpoint.
    #[must_use]
    pub fn resuming(mut self, checkpoint: Checkpoint) -> Self {
        self.resume_from = Some(checkpoint);
        self
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Returns the checkpoint this run resumes from.
    #[must_use]
    pub fn resume_from(&self) -> Option<&Checkpoint> {
        self.resume_from.as_ref()
    }

    /// Returns true if the run resumes from a checkpoint.
    #[must_use]
    pub fn is_resumed(&self) -> bool {
        self.resume_from.is_some()
    }

    /// Returns when the context was created.
    #[must_use]
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Releases per-run resources once the run has finished.
    pub fn finish(&mut self) {
        self.breakers.clear();
    }
}
