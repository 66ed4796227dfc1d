//! The recovery engine: the only component that calls into stage code.

use super::{RecoveryStrategy, StrategyAdjuster};
use crate::breaker::BreakerDecision;
use crate::checkpoint::{Checkpoint, CheckpointStore, ResumeAction};
use crate::context::RunContext;
use crate::core::{AttemptPhase, AttemptRecord, Payload, PipelineState, StageError, StageResult};
use crate::errors::{Result, SupervisorError};
use crate::events::{EventNotifier, PipelineEvent};
use crate::health::HealthMonitor;
use crate::observability::SpanTimer;
use crate::stack::EntryContext;
use crate::stages::Stage;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Result of a completed pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// The run.
    pub run_id: String,
    /// One result per stage, in pipeline order.
    pub results: Vec<StageResult>,
    /// Stages whose result was reused from a checkpoint.
    pub resumed_stages: usize,
    /// Final checkpoint of the run.
    pub checkpoint: Checkpoint,
    /// Latest payload per stage, read from the state stack.
    pub latest_results: BTreeMap<String, Payload>,
}

impl PipelineOutcome {
    /// Returns the result for a stage.
    #[must_use]
    pub fn result_for(&self, stage_name: &str) -> Option<&StageResult> {
        self.results.iter().find(|r| r.stage_name == stage_name)
    }
}

/// Drives stages under their recovery strategy.
///
/// The engine holds no per-run state. Everything a run mutates is passed
/// in as a [`RunContext`], so one engine can serve many concurrent runs.
pub struct RecoveryEngine {
    store: Arc<dyn CheckpointStore>,
    notifier: Arc<EventNotifier>,
    health: Option<Arc<HealthMonitor>>,
    adjusters: Vec<Arc<dyn StrategyAdjuster>>,
    default_strategy: RecoveryStrategy,
    stage_strategies: HashMap<String, RecoveryStrategy>,
}

impl RecoveryEngine {
    /// Creates an engine persisting checkpoints to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            store,
            notifier: Arc::new(EventNotifier::new()),
            health: None,
            adjusters: Vec::new(),
            default_strategy: RecoveryStrategy::default(),
            stage_strategies: HashMap::new(),
        }
    }

    /// Sets the event notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<EventNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Sets the health monitor consulted for hang signals.
    #[must_use]
    pub fn with_health_monitor(mut self, monitor: Arc<HealthMonitor>) -> Self {
        self.health = Some(monitor);
        self
    }

    /// Adds a strategy adjuster.
    #[must_use]
    pub fn with_adjuster(mut self, adjuster: Arc<dyn StrategyAdjuster>) -> Self {
        self.adjusters.push(adjuster);
        self
    }

    /// Sets the strategy for stages without their own.
    #[must_use]
    pub fn with_default_strategy(mut self, strategy: RecoveryStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Sets the strategy for one stage.
    #[must_use]
    pub fn with_stage_strategy(mut self, stage_name: impl Into<String>, strategy: RecoveryStrategy) -> Self {
        self.stage_strategies.insert(stage_name.into(), strategy);
        self
    }

    /// Returns the checkpoint store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Returns the event notifier.
    #[must_use]
    pub fn notifier(&self) -> &Arc<EventNotifier> {
        &self.notifier
    }

    /// Returns the health monitor, if any.
    #[must_use]
    pub fn health_monitor(&self) -> Option<&Arc<HealthMonitor>> {
        self.health.as_ref()
    }

    /// Returns the base strategy for a stage.
    #[must_use]
    pub fn strategy_for(&self, stage_name: &str) -> &RecoveryStrategy {
        self.stage_strategies
            .get(stage_name)
            .unwrap_or(&self.default_strategy)
    }

    fn effective_strategy(&self, stage_name: &str, base: &RecoveryStrategy, ctx: &RunContext) -> RecoveryStrategy {
        self.adjusters.iter().fold(base.clone(), |current, adjuster| {
            adjuster
                .adjust(stage_name, &current, &ctx.stack)
                .unwrap_or(current)
        })
    }

    fn take_hang_signal(&self, stage_name: &str) -> Option<StageError> {
        let handles = self.health.as_ref()?.take_hang_signal(stage_name)?;
        Some(StageError::hung(format!(
            "process(es) {handles:?} exceeded the hang thresholds"
        )))
    }

    async fn emit(&self, event: PipelineEvent) {
        self.notifier.notify(event).await;
    }

    /// Runs one stage with retries, backoff and circuit breaking.
    ///
    /// Returns the successful result, or `Exhausted` / `CircuitOpen` with
    /// every failed attempt of this call attached.
    pub async fn run_stage(
        &self,
        ctx: &mut RunContext,
        stage: &dyn Stage,
        input: &Payload,
        strategy: &RecoveryStrategy,
    ) -> Result<StageResult> {
        let stage_name = stage.name().to_string();
        let run_id = ctx.run_id().to_string();
        let mut phase = AttemptPhase::Pending;

        if let BreakerDecision::Reject { retry_after } = ctx.breakers.check(&stage_name) {
            let consecutive_failures = ctx.breakers.consecutive_failures(&stage_name);
            advance(&mut phase, AttemptPhase::CircuitOpen, &stage_name);
            warn!(
                run_id = %run_id,
                stage = %stage_name,
                consecutive_failures,
                retry_after_ms = duration_ms(retry_after),
                "Circuit open, refusing stage"
            );
            return Err(SupervisorError::CircuitOpen {
                stage: stage_name,
                consecutive_failures,
                retry_after,
                attempts: Vec::new(),
            });
        }

        let mut attempt = 0;
        if let Some(checkpoint) = ctx.resume_from() {
            match checkpoint.resume_action(&stage_name) {
                ResumeAction::Skip(result) => {
                    advance(&mut phase, AttemptPhase::Succeeded, &stage_name);
                    return self.replay(ctx, result).await;
                }
                ResumeAction::Retry { from_attempt } => {
                    info!(run_id = %run_id, stage = %stage_name, from_attempt, "Resuming failed stage");
                    attempt = from_attempt;
                }
                ResumeAction::Run => {}
            }
        }

        ctx.stack.push(
            PipelineState::StageStarted,
            EntryContext::for_stage(&stage_name).with_retry_count(attempt),
        )?;
        self.emit(PipelineEvent::started(&run_id, &stage_name).with_data("attempt", attempt))
            .await;

        let mut history: Vec<AttemptRecord> = Vec::new();

        loop {
            advance(&mut phase, AttemptPhase::Running, &stage_name);
            debug!(run_id = %run_id, stage = %stage_name, attempt, "Executing stage");

            let timer = SpanTimer::start(format!("{run_id}/{stage_name}"));
            let executed = stage.execute(input).await;
            let hang = self.take_hang_signal(&stage_name);
            let duration = timer.finish();

            let outcome = match (executed, hang) {
                (Ok(_), Some(hung)) => Err(hung),
                (other, _) => other,
            };

            match outcome {
                Ok(payload) => {
                    // Breaker first, so a failed push or save never strands a half-open trial.
                    ctx.breakers.record_success(&stage_name);
                    ctx.stack.push(
                        PipelineState::StageCompleted,
                        EntryContext::for_stage(&stage_name)
                            .with_result(payload.clone())
                            .with_retry_count(attempt)
                            .with_duration(duration),
                    )?;
                    let result = StageResult::success(&stage_name, payload, duration, attempt);
                    ctx.checkpoint.record_mut(result.clone());
                    self.store.save(&ctx.checkpoint.build()).await?;
                    advance(&mut phase, AttemptPhase::Succeeded, &stage_name);

                    info!(
                        run_id = %run_id,
                        stage = %stage_name,
                        attempt,
                        duration_ms = duration * 1000.0,
                        "Stage completed"
                    );
                    self.emit(
                        PipelineEvent::completed(&run_id, &stage_name)
                            .with_data("attempt", attempt)
                            .with_data("duration", duration),
                    )
                    .await;
                    return Ok(result);
                }
                Err(stage_error) => {
                    let tripped = ctx.breakers.record_failure(&stage_name);
                    ctx.stack.push(
                        PipelineState::StageFailed,
                        EntryContext::for_stage(&stage_name)
                            .with_error(stage_error.clone())
                            .with_retry_count(attempt)
                            .with_duration(duration),
                    )?;
                    ctx.checkpoint.record_mut(StageResult::failed(
                        &stage_name,
                        stage_error.clone(),
                        duration,
                        attempt,
                    ));
                    self.store.save(&ctx.checkpoint.build()).await?;
                    history.push(AttemptRecord::new(attempt, stage_error.clone(), duration));

                    warn!(
                        run_id = %run_id,
                        stage = %stage_name,
                        attempt,
                        error = %stage_error,
                        "Stage attempt failed"
                    );
                    self.emit(
                        PipelineEvent::failed(&run_id, &stage_name)
                            .with_data("attempt", attempt)
                            .with_data("error", stage_error.to_json()),
                    )
                    .await;

                    let effective = self.effective_strategy(&stage_name, strategy, ctx);

                    if attempt >= effective.max_retries {
                        advance(&mut phase, AttemptPhase::FailedFatal, &stage_name);
                        error!(
                            run_id = %run_id,
                            stage = %stage_name,
                            attempts = history.len(),
                            "Stage exhausted its retries"
                        );
                        return Err(SupervisorError::Exhausted {
                            stage: stage_name,
                            attempts: history,
                        });
                    }

                    if tripped {
                        advance(&mut phase, AttemptPhase::CircuitOpen, &stage_name);
                        ctx.stack.push(
                            PipelineState::CircuitOpen,
                            EntryContext::for_stage(&stage_name).with_retry_count(attempt),
                        )?;
                        let retry_after = ctx
                            .breakers
                            .get(&stage_name)
                            .map_or(Duration::ZERO, |b| b.remaining_cooldown());
                        return Err(SupervisorError::CircuitOpen {
                            consecutive_failures: ctx.breakers.consecutive_failures(&stage_name),
                            stage: stage_name,
                            retry_after,
                            attempts: history,
                        });
                    }

                    advance(&mut phase, AttemptPhase::FailedRetryable, &stage_name);
                    let next = attempt + 1;
                    let delay = effective.backoff_delay(next);
                    ctx.stack.push(
                        PipelineState::Recovering,
                        EntryContext::for_stage(&stage_name)
                            .with_retry_count(next)
                            .with_extra("delay_ms", json!(duration_ms(delay))),
                    )?;
                    info!(
                        run_id = %run_id,
                        stage = %stage_name,
                        attempt = next,
                        delay_ms = duration_ms(delay),
                        "Retrying stage after backoff"
                    );
                    self.emit(
                        PipelineEvent::progress(&run_id, &stage_name)
                            .with_data("attempt", next)
                            .with_data("delay_ms", duration_ms(delay)),
                    )
                    .await;

                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
            }
        }
    }

    /// Records a checkpointed success on the stack without re-executing.
    async fn replay(&self, ctx: &mut RunContext, result: StageResult) -> Result<StageResult> {
        let run_id = ctx.run_id().to_string();
        ctx.stack.push(
            PipelineState::StageStarted,
            EntryContext::for_stage(&result.stage_name)
                .with_retry_count(result.retry_count)
                .with_extra("resumed", json!(true)),
        )?;
        ctx.stack.push(
            PipelineState::StageCompleted,
            EntryContext::for_stage(&result.stage_name)
                .with_result(result.payload.clone())
                .with_retry_count(result.retry_count)
                .with_duration(result.duration)
                .with_extra("resumed", json!(true)),
        )?;
        ctx.checkpoint.record_mut(result.clone());

        info!(run_id = %run_id, stage = %result.stage_name, "Reused checkpointed result");
        self.emit(
            PipelineEvent::completed(&run_id, &result.stage_name)
                .with_data("attempt", result.retry_count)
                .with_data("resumed", true),
        )
        .await;
        Ok(result)
    }

    /// Runs stages in order, stopping at the first stage that cannot succeed.
    ///
    /// Each stage receives `input` plus every upstream stage's latest result
    /// under the upstream stage's name. A `Terminal` entry closes the stack
    /// whether the run succeeds or not.
    pub async fn run_pipeline(
        &self,
        ctx: &mut RunContext,
        stages: &[Arc<dyn Stage>],
        input: Payload,
    ) -> Result<PipelineOutcome> {
        let mut seen = HashSet::new();
        if let Some(duplicate) = stages.iter().map(|s| s.name()).find(|n| !seen.insert(*n)) {
            return Err(SupervisorError::Config(format!(
                "duplicate stage name '{duplicate}'"
            )));
        }

        let run_id = ctx.run_id().to_string();
        if let Some(checkpoint) = ctx.resume_from() {
            let plan = checkpoint.resume_plan(stages.iter().map(|s| s.name()));
            info!(
                run_id = %run_id,
                skipped = plan.skipped(),
                first_pending = plan.first_pending().unwrap_or("-"),
                "Resuming run from checkpoint"
            );
        }

        let mut results = Vec::with_capacity(stages.len());
        let mut resumed_stages = 0;

        for stage in stages {
            let stage_input = stage_input(&input, ctx);
            let strategy = self.strategy_for(stage.name()).clone();
            let resumed = ctx
                .resume_from()
                .is_some_and(|cp| matches!(cp.resume_action(stage.name()), ResumeAction::Skip(_)));

            match self.run_stage(ctx, stage.as_ref(), &stage_input, &strategy).await {
                Ok(result) => {
                    if resumed {
                        resumed_stages += 1;
                    }
                    results.push(result);
                }
                Err(e) => {
                    close_stack(ctx, "failed");
                    error!(run_id = %run_id, stage = stage.name(), error = %e, "Run failed");
                    return Err(e);
                }
            }
        }

        close_stack(ctx, "succeeded");
        let checkpoint = ctx.checkpoint.build();
        info!(run_id = %run_id, stages = results.len(), resumed_stages, "Run succeeded");

        Ok(PipelineOutcome {
            run_id,
            results,
            resumed_stages,
            checkpoint,
            latest_results: ctx.stack.get_all_latest_results(),
        })
    }
}

impl std::fmt::Debug for RecoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryEngine")
            .field("adjusters", &self.adjusters)
            .field("default_strategy", &self.default_strategy)
            .field("stage_strategies", &self.stage_strategies)
            .field("health", &self.health.is_some())
            .finish_non_exhaustive()
    }
}

fn advance(phase: &mut AttemptPhase, next: AttemptPhase, stage_name: &str) {
    debug_assert!(
        phase.can_transition_to(next),
        "illegal attempt phase change {phase} -> {next}"
    );
    trace!(stage = stage_name, from = %phase, to = %next, "Attempt phase");
    *phase = next;
}

fn stage_input(input: &Payload, ctx: &RunContext) -> Payload {
    let mut merged = input.clone();
    for (stage, payload) in ctx.stack.get_all_latest_results() {
        merged.insert(stage, Value::Object(payload));
    }
    merged
}

fn close_stack(ctx: &mut RunContext, status: &str) {
    if let Err(e) = ctx.stack.push(
        PipelineState::Terminal,
        EntryContext::new().with_extra("status", json!(status)),
    ) {
        debug!(run_id = %ctx.run_id(), error = %e, "Stack not closed");
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{BreakerConfig, BreakerPhase};
    use crate::checkpoint::InMemoryCheckpointStore;
    use crate::core::ErrorKind;
    use crate::events::{CollectingObserver, EventType};
    use crate::testing::{AlwaysFailingStage, ScriptedStage};
    use crate::utils::ManualClock;
    use pretty_assertions::assert_eq;

    fn engine() -> (RecoveryEngine, Arc<InMemoryCheckpointStore>, Arc<CollectingObserver>) {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let observer = Arc::new(CollectingObserver::new());
        let notifier = Arc::new(EventNotifier::new().with_observer(observer.clone()));
        let engine = RecoveryEngine::new(store.clone()).with_notifier(notifier);
        (engine, store, observer)
    }

    /// Store whose first `failures` saves fail.
    #[derive(Debug, Default)]
    struct FlakyStore {
        inner: InMemoryCheckpointStore,
        failures: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CheckpointStore for FlakyStore {
        async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
            use std::sync::atomic::Ordering;
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(std::io::Error::other("disk full").into());
            }
            self.inner.save(checkpoint).await
        }

        async fn load(&self, run_id: &str) -> Option<Checkpoint> {
            self.inner.load(run_id).await
        }

        async fn delete(&self, run_id: &str) -> Result<bool> {
            self.inner.delete(run_id).await
        }

        async fn list_runs(&self) -> Result<Vec<String>> {
            self.inner.list_runs().await
        }
    }

    fn context(breaker: BreakerConfig) -> RunContext {
        RunContext::new("run-1", 1, breaker)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let (engine, store, observer) = engine();
        let mut ctx = context(BreakerConfig::default());
        let stage = ScriptedStage::succeeding("plan");

        let result = engine
            .run_stage(&mut ctx, &stage, &Payload::new(), &RecoveryStrategy::default())
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.retry_count, 0);
        assert_eq!(
            ctx.stack.entries().iter().map(|e| e.state).collect::<Vec<_>>(),
            vec![
                PipelineState::Initialized,
                PipelineState::StageStarted,
                PipelineState::StageCompleted
            ]
        );
        assert_eq!(observer.event_types(), vec![EventType::Started, EventType::Completed]);
        assert!(store.load("run-1").await.unwrap().result_for("plan").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_follow_backoff() {
        let (engine, _store, observer) = engine();
        let mut ctx = context(BreakerConfig::new(10, 60.0));
        let stage = ScriptedStage::failing_then_succeeding("build", 3);
        let strategy = RecoveryStrategy::new(5, 1.0, 60.0, 2.0);

        let started = tokio::time::Instant::now();
        let result = engine
            .run_stage(&mut ctx, &stage, &Payload::new(), &strategy)
            .await
            .unwrap();

        assert_eq!(result.retry_count, 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(1 + 2 + 4));
        assert!(waited < Duration::from_millis(7_100));

        let delays: Vec<_> = observer
            .events_of_type(EventType::Progress)
            .iter()
            .map(|e| e.get("delay_ms").cloned())
            .collect();
        assert_eq!(
            delays,
            vec![Some(json!(1000)), Some(json!(2000)), Some(json!(4000))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_refuses_without_push() {
        let (engine, _store, observer) = engine();
        let mut ctx = context(BreakerConfig::new(1, 60.0));
        ctx.breakers.record_failure("deploy");
        let stage = ScriptedStage::succeeding("deploy");

        let err = engine
            .run_stage(&mut ctx, &stage, &Payload::new(), &RecoveryStrategy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SupervisorError::CircuitOpen { ref attempts, .. } if attempts.is_empty()));
        assert_eq!(stage.calls(), 0);
        assert_eq!(ctx.stack.len(), 1);
        assert!(observer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_trip_stops_retries() {
        let (engine, _store, _observer) = engine();
        let clock = Arc::new(ManualClock::default());
        let mut ctx = RunContext::with_clock("run-1", 1, BreakerConfig::new(2, 30.0), clock);
        let stage = AlwaysFailingStage::new("flaky", ErrorKind::Transient);

        let err = engine
            .run_stage(&mut ctx, &stage, &Payload::new(), &RecoveryStrategy::new(10, 0.1, 5.0, 1.0))
            .await
            .unwrap_err();

        match err {
            SupervisorError::CircuitOpen {
                consecutive_failures,
                retry_after,
                attempts,
                ..
            } => {
                assert_eq!(consecutive_failures, 2);
                assert_eq!(attempts.len(), 2);
                assert_eq!(retry_after, Duration::from_secs(30));
            }
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
        assert_eq!(stage.calls(), 2);
        assert_eq!(ctx.stack.current_state(), Some(PipelineState::CircuitOpen));
        assert_eq!(
            ctx.breakers.get("flaky").map(|b| b.phase()),
            Some(BreakerPhase::Open)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_wins_over_trip() {
        let (engine, _store, _observer) = engine();
        let mut ctx = context(BreakerConfig::new(2, 30.0));
        let stage = AlwaysFailingStage::new("flaky", ErrorKind::Timeout);

        let err = engine
            .run_stage(&mut ctx, &stage, &Payload::new(), &RecoveryStrategy::new(1, 0.1, 5.0, 1.0))
            .await
            .unwrap_err();

        assert!(matches!(err, SupervisorError::Exhausted { .. }));
        assert_eq!(ctx.stack.current_state(), Some(PipelineState::StageFailed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_checkpointed_before_backoff() {
        let (engine, store, _observer) = engine();
        let mut ctx = context(BreakerConfig::default());
        let stage = AlwaysFailingStage::new("build", ErrorKind::Internal);

        let _ = engine
            .run_stage(&mut ctx, &stage, &Payload::new(), &RecoveryStrategy::no_retry())
            .await;

        let saved = store.load("run-1").await.unwrap();
        let result = saved.result_for("build").unwrap();
        assert!(!result.is_success());
        assert_eq!(result.error.as_ref().map(|e| e.kind.clone()), Some(ErrorKind::Internal));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_releases_half_open_trial() {
        let store = Arc::new(FlakyStore::default());
        store.failures.store(1, std::sync::atomic::Ordering::SeqCst);
        let engine = RecoveryEngine::new(store.clone());
        let clock = Arc::new(ManualClock::default());
        let mut ctx = RunContext::with_clock("run-1", 1, BreakerConfig::new(1, 30.0), clock.clone());
        assert!(ctx.breakers.record_failure("deploy"));
        clock.advance_secs(31.0);
        let stage = ScriptedStage::succeeding("deploy");

        let first = engine
            .run_stage(&mut ctx, &stage, &Payload::new(), &RecoveryStrategy::no_retry())
            .await;
        assert!(matches!(first, Err(SupervisorError::Io(_))));
        assert_eq!(
            ctx.breakers.get("deploy").map(|b| b.phase()),
            Some(BreakerPhase::Closed)
        );

        let second = engine
            .run_stage(&mut ctx, &stage, &Payload::new(), &RecoveryStrategy::no_retry())
            .await
            .unwrap();
        assert!(second.is_success());
        assert_eq!(stage.calls(), 2);
        assert!(store.load("run-1").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_after_failed_trial_reopens_circuit() {
        let store = Arc::new(FlakyStore::default());
        store.failures.store(1, std::sync::atomic::Ordering::SeqCst);
        let engine = RecoveryEngine::new(store);
        let clock = Arc::new(ManualClock::default());
        let mut ctx = RunContext::with_clock("run-1", 1, BreakerConfig::new(1, 30.0), clock.clone());
        assert!(ctx.breakers.record_failure("deploy"));
        clock.advance_secs(31.0);
        let stage = AlwaysFailingStage::new("deploy", ErrorKind::Transient);

        let first = engine
            .run_stage(&mut ctx, &stage, &Payload::new(), &RecoveryStrategy::no_retry())
            .await;
        assert!(matches!(first, Err(SupervisorError::Io(_))));

        clock.advance_secs(31.0);
        let second = engine
            .run_stage(&mut ctx, &stage, &Payload::new(), &RecoveryStrategy::no_retry())
            .await
            .unwrap_err();
        assert!(matches!(second, SupervisorError::Exhausted { .. }));
        assert_eq!(stage.calls(), 2);
    }
}
