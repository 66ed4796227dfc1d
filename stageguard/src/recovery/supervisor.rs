//! Entry point wiring configuration, storage and runs together.

use super::{PipelineOutcome, QualityGate, RecoveryEngine};
use crate::checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
use crate::config::SupervisorConfig;
use crate::context::{RunContext, RunRegistry};
use crate::core::Payload;
use crate::errors::{Result, SupervisorError};
use crate::events::EventNotifier;
use crate::health::{HealthMonitor, ProcessProbe, SamplerHandle};
use crate::stages::Stage;
use crate::utils::{generate_run_id, is_valid_run_id, Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info_span, warn, Instrument};

/// Runs pipelines under a [`SupervisorConfig`].
///
/// Each call to [`Supervisor::run`] gets its own [`RunContext`]; runs with
/// different ids proceed concurrently without sharing state.
#[derive(Debug)]
pub struct Supervisor {
    config: SupervisorConfig,
    engine: RecoveryEngine,
    runs: RunRegistry,
    clock: Arc<dyn Clock>,
}

impl Supervisor {
    /// Validates `config` and builds a supervisor with the store it names.
    ///
    /// A `checkpoint_dir` selects [`FileCheckpointStore`]; otherwise
    /// checkpoints stay in memory.
    pub async fn new(config: SupervisorConfig) -> Result<Self> {
        config.validate().map_err(SupervisorError::Config)?;
        let store: Arc<dyn CheckpointStore> = match &config.checkpoint_dir {
            Some(dir) => Arc::new(FileCheckpointStore::new(dir).await?),
            None => Arc::new(InMemoryCheckpointStore::new()),
        };
        Self::with_store(config, store)
    }

    /// Builds a supervisor around an existing checkpoint store.
    pub fn with_store(config: SupervisorConfig, store: Arc<dyn CheckpointStore>) -> Result<Self> {
        config.validate().map_err(SupervisorError::Config)?;

        let mut engine = RecoveryEngine::new(store).with_default_strategy(config.default_strategy.clone());
        for (stage, strategy) in &config.stage_strategies {
            engine = engine.with_stage_strategy(stage.clone(), strategy.clone());
        }
        if let Some(gate) = &config.quality_gate {
            engine = engine.with_adjuster(Arc::new(QualityGate::new(gate.clone())));
        }

        Ok(Self {
            config,
            engine,
            runs: RunRegistry::new(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Sets the event notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<EventNotifier>) -> Self {
        self.engine = self.engine.with_notifier(notifier);
        self
    }

    /// Attaches a health monitor built from the configured thresholds.
    #[must_use]
    pub fn with_probe(self, probe: Arc<dyn ProcessProbe>) -> Self {
        let monitor = Arc::new(HealthMonitor::new(probe, self.config.health.clone()));
        self.with_health_monitor(monitor)
    }

    /// Attaches an existing health monitor.
    #[must_use]
    pub fn with_health_monitor(mut self, monitor: Arc<HealthMonitor>) -> Self {
        self.engine = self.engine.with_health_monitor(monitor);
        self
    }

    /// Sets the clock used by circuit breakers.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Returns the engine.
    #[must_use]
    pub fn engine(&self) -> &RecoveryEngine {
        &self.engine
    }

    /// Returns the registry of in-flight runs.
    #[must_use]
    pub fn runs(&self) -> &RunRegistry {
        &self.runs
    }

    /// Starts the background health sampler, if a monitor is attached.
    #[must_use]
    pub fn start_health_sampler(&self) -> Option<SamplerHandle> {
        let monitor = self.engine.health_monitor()?;
        Some(monitor.spawn_sampler(Duration::from_millis(self.config.sample_interval_ms)))
    }

    /// Runs a pipeline under a fresh run id.
    pub async fn start(&self, stages: &[Arc<dyn Stage>], input: Payload) -> Result<PipelineOutcome> {
        self.run(&generate_run_id(), stages, input).await
    }

    /// Runs, or resumes, the pipeline for `run_id`.
    ///
    /// A usable checkpoint for the run is resumed: successful stages are
    /// skipped and failed ones continue from their recorded attempt. A
    /// checkpoint written for a different number of stages is ignored.
    pub async fn run(&self, run_id: &str, stages: &[Arc<dyn Stage>], input: Payload) -> Result<PipelineOutcome> {
        if !is_valid_run_id(run_id) {
            return Err(SupervisorError::Config(format!("invalid run id '{run_id}'")));
        }

        let mut context = RunContext::with_clock(
            run_id,
            stages.len(),
            self.config.breaker.clone(),
            Arc::clone(&self.clock),
        );
        match self.engine.store().load(run_id).await {
            Some(checkpoint) if checkpoint.total_stages == stages.len() => {
                context = context.resuming(checkpoint);
            }
            Some(checkpoint) => {
                warn!(
                    run_id,
                    recorded = checkpoint.total_stages,
                    requested = stages.len(),
                    "Checkpoint stage count mismatch, starting fresh"
                );
            }
            None => {}
        }

        let handle = self
            .runs
            .begin(context)
            .ok_or_else(|| SupervisorError::Config(format!("run '{run_id}' is already in progress")))?;

        let outcome = {
            let mut ctx = handle.lock().await;
            self.engine
                .run_pipeline(&mut ctx, stages, input)
                .instrument(info_span!("run", run_id = %run_id))
                .await
        };

        self.runs.end_run(run_id).await;
        outcome
    }

    /// Removes the stored checkpoint for a run. Returns true if one existed.
    pub async fn discard_checkpoint(&self, run_id: &str) -> Result<bool> {
        self.engine.store().delete(run_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::RecoveryStrategy;
    use crate::testing::ScriptedStage;

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = SupervisorConfig::new().with_default_strategy(RecoveryStrategy::default().with_timeout(-1.0));
        let err = Supervisor::new(config).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Config(_)));
    }

    #[tokio::test]
    async fn test_new_with_checkpoint_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = SupervisorConfig::new().with_checkpoint_dir(dir.path().join("cp"));
        let supervisor = Supervisor::new(config).await.unwrap();
        assert!(dir.path().join("cp").is_dir());
        assert!(supervisor.start_health_sampler().is_none());
    }

    #[tokio::test]
    async fn test_rejects_invalid_run_id() {
        let supervisor = Supervisor::new(SupervisorConfig::new()).await.unwrap();
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(ScriptedStage::succeeding("plan"))];
        let err = supervisor.run("../escape", &stages, Payload::new()).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Config(_)));
    }

    #[tokio::test]
    async fn test_start_generates_run_id() {
        let supervisor = Supervisor::new(SupervisorConfig::new()).await.unwrap();
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(ScriptedStage::succeeding("plan"))];
        let outcome = supervisor.start(&stages, Payload::new()).await.unwrap();

        assert!(is_valid_run_id(&outcome.run_id));
        assert!(supervisor.runs().is_empty());
        assert!(supervisor.discard_checkpoint(&outcome.run_id).await.unwrap());
    }
}
