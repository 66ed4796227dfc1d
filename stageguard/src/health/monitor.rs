//! Registry of stage-spawned processes with hang and zombie detection.

use super::{ProbeStatus, ProcessProbe};
use crate::core::ProcessHealthSample;
use crate::utils::{seconds_between, Clock, SystemClock, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Thresholds for hang detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HangThresholds {
    /// CPU percent a process must exceed.
    pub cpu_threshold: f64,
    /// Seconds a process must have run for.
    pub duration_threshold: f64,
}

impl Default for HangThresholds {
    fn default() -> Self {
        Self {
            cpu_threshold: 90.0,
            duration_threshold: 600.0,
        }
    }
}

impl HangThresholds {
    /// Creates new thresholds.
    #[must_use]
    pub fn new(cpu_threshold: f64, duration_threshold: f64) -> Self {
        Self {
            cpu_threshold,
            duration_threshold,
        }
    }

    /// Validates the thresholds.
    pub fn validate(&self) -> Result<(), String> {
        if !self.cpu_threshold.is_finite() || self.cpu_threshold < 0.0 {
            return Err("cpu_threshold must be a non-negative number".to_string());
        }
        if !self.duration_threshold.is_finite() || self.duration_threshold < 0.0 {
            return Err("duration_threshold must be a non-negative number".to_string());
        }
        Ok(())
    }
}

/// Returns true if a sample looks like a spinning, stuck process.
///
/// Both comparisons are strict: sitting exactly on a threshold is not a hang.
#[must_use]
pub fn is_hanging(sample: &ProcessHealthSample, cpu_threshold: f64, duration_threshold: f64) -> bool {
    sample.cpu_percent > cpu_threshold && sample.elapsed_seconds > duration_threshold
}

#[derive(Debug, Clone)]
struct Registration {
    stage_name: Option<String>,
    registered_at: Timestamp,
}

/// Outcome of one monitoring pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthReport {
    /// Samples classified as hanging.
    pub hanging: Vec<ProcessHealthSample>,
    /// Handles removed because their process is gone or a zombie.
    pub reclaimed: Vec<u32>,
}

/// Tracks liveness of stage-spawned processes.
///
/// The monitor never kills anything. Hanging handles that belong to a stage
/// raise a hang signal the recovery engine picks up on its next check.
pub struct HealthMonitor {
    probe: Arc<dyn ProcessProbe>,
    thresholds: HangThresholds,
    clock: Arc<dyn Clock>,
    registry: Mutex<HashMap<u32, Registration>>,
    hang_signals: Mutex<HashMap<String, BTreeSet<u32>>>,
}

impl HealthMonitor {
    /// Creates a monitor.
    #[must_use]
    pub fn new(probe: Arc<dyn ProcessProbe>, thresholds: HangThresholds) -> Self {
        Self::with_clock(probe, thresholds, Arc::new(SystemClock))
    }

    /// Creates a monitor with an explicit clock.
    #[must_use]
    pub fn with_clock(
        probe: Arc<dyn ProcessProbe>,
        thresholds: HangThresholds,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            probe,
            thresholds,
            clock,
            registry: Mutex::new(HashMap::new()),
            hang_signals: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the hang thresholds.
    #[must_use]
    pub fn thresholds(&self) -> &HangThresholds {
        &self.thresholds
    }

    /// Starts tracking a handle.
    pub fn register(&self, handle_id: u32) {
        self.insert(handle_id, None);
    }

    /// Starts tracking a handle on behalf of a stage.
    pub fn register_for_stage(&self, handle_id: u32, stage_name: impl Into<String>) {
        self.insert(handle_id, Some(stage_name.into()));
    }

    fn insert(&self, handle_id: u32, stage_name: Option<String>) {
        debug!(handle_id, stage = stage_name.as_deref().unwrap_or("-"), "Process registered");
        self.registry.lock().insert(
            handle_id,
            Registration {
                stage_name,
                registered_at: self.clock.now(),
            },
        );
    }

    /// Stops tracking a handle. Returns true if it was tracked.
    pub fn unregister(&self, handle_id: u32) -> bool {
        self.registry.lock().remove(&handle_id).is_some()
    }

    /// Returns true if a handle is tracked.
    #[must_use]
    pub fn is_registered(&self, handle_id: u32) -> bool {
        self.registry.lock().contains_key(&handle_id)
    }

    /// Returns the number of tracked handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    /// Polls every live registered handle.
    ///
    /// Zombies and vanished processes produce no sample; they are left for
    /// [`HealthMonitor::reclaim_zombies`].
    #[must_use]
    pub fn sample(&self) -> Vec<ProcessHealthSample> {
        let now = self.clock.now();
        let registrations: Vec<(u32, Timestamp)> = self
            .registry
            .lock()
            .iter()
            .map(|(id, r)| (*id, r.registered_at))
            .collect();

        let mut samples: Vec<_> = registrations
            .into_iter()
            .filter_map(|(handle_id, registered_at)| match self.probe.probe(handle_id) {
                ProbeStatus::Alive { cpu_percent } => Some(ProcessHealthSample {
                    handle_id,
                    cpu_percent,
                    elapsed_seconds: seconds_between(registered_at, now),
                    last_seen: now,
                }),
                ProbeStatus::Zombie | ProbeStatus::Gone => None,
            })
            .collect();
        samples.sort_by_key(|s| s.handle_id);
        samples
    }

    /// Returns current samples that look hung under the configured thresholds.
    #[must_use]
    pub fn find_hanging(&self) -> Vec<ProcessHealthSample> {
        let HangThresholds {
            cpu_threshold,
            duration_threshold,
        } = self.thresholds;
        self.sample()
            .into_iter()
            .filter(|s| is_hanging(s, cpu_threshold, duration_threshold))
            .collect()
    }

    /// Removes handles whose process is gone or a zombie.
    ///
    /// Returns the removed handles, sorted.
    pub fn reclaim_zombies(&self) -> Vec<u32> {
        let handles: Vec<u32> = self.registry.lock().keys().copied().collect();
        let dead: Vec<u32> = handles
            .into_iter()
            .filter(|&id| matches!(self.probe.probe(id), ProbeStatus::Zombie | ProbeStatus::Gone))
            .collect();

        let mut reclaimed = Vec::with_capacity(dead.len());
        {
            let mut registry = self.registry.lock();
            for id in dead {
                if registry.remove(&id).is_some() {
                    reclaimed.push(id);
                }
            }
        }
        reclaimed.sort_unstable();

        if !reclaimed.is_empty() {
            info!(handles = ?reclaimed, "Reclaimed dead processes");
        }
        reclaimed
    }

    /// Runs one monitoring pass: records hang signals, then reclaims zombies.
    pub fn check(&self) -> HealthReport {
        let hanging = self.find_hanging();

        if !hanging.is_empty() {
            let registry = self.registry.lock();
            let mut signals = self.hang_signals.lock();
            for sample in &hanging {
                let stage = registry
                    .get(&sample.handle_id)
                    .and_then(|r| r.stage_name.clone());
                warn!(
                    handle_id = sample.handle_id,
                    cpu_percent = sample.cpu_percent,
                    elapsed_seconds = sample.elapsed_seconds,
                    stage = stage.as_deref().unwrap_or("-"),
                    "Process appears hung"
                );
                if let Some(stage) = stage {
                    signals.entry(stage).or_default().insert(sample.handle_id);
                }
            }
        }

        HealthReport {
            hanging,
            reclaimed: self.reclaim_zombies(),
        }
    }

    /// Returns true if a stage has an unconsumed hang signal.
    #[must_use]
    pub fn has_hang_signal(&self, stage_name: &str) -> bool {
        self.hang_signals.lock().contains_key(stage_name)
    }

    /// Returns true if a handle has been flagged as hanging and not yet consumed.
    #[must_use]
    pub fn is_marked_hanging(&self, handle_id: u32) -> bool {
        self.hang_signals
            .lock()
            .values()
            .any(|handles| handles.contains(&handle_id))
    }

    /// Consumes the hang signal for a stage, returning the hung handles.
    pub fn take_hang_signal(&self, stage_name: &str) -> Option<Vec<u32>> {
        self.hang_signals
            .lock()
            .remove(stage_name)
            .map(|set| set.into_iter().collect())
    }

    /// Starts a background loop calling [`HealthMonitor::check`] every `interval`.
    #[must_use]
    pub fn spawn_sampler(self: &Arc<Self>, interval: Duration) -> SamplerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let monitor = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = monitor.check();
                        debug!(
                            hanging = report.hanging.len(),
                            reclaimed = report.reclaimed.len(),
                            "Health check complete"
                        );
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Health sampler stopped");
        });

        SamplerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("thresholds", &self.thresholds)
            .field("registered", &self.len())
            .finish_non_exhaustive()
    }
}

/// Handle to a running background sampler.
#[derive(Debug)]
pub struct SamplerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SamplerHandle {
    /// Stops the sampler and waits for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Health sampler task failed");
        }
    }
}
