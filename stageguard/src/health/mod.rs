//! Liveness tracking for stage-spawned worker processes.
//!
//! This module provides:
//! - `ProcessProbe`: the seam to the operating system
//! - `HealthMonitor`: registry, sampling, hang detection, zombie reclamation
//! - `stage_statistics`: per-stage duration and failure-rate aggregation

mod monitor;
mod probe;
mod stats;

pub use monitor::{is_hanging, HangThresholds, HealthMonitor, HealthReport, SamplerHandle};
pub use probe::{ProbeStatus, ProcessProbe, ProcfsProbe};
pub use stats::{stage_statistics, ExecutionRecord, StageStatistics};

#[cfg(test)]
pub use probe::MockProcessProbe;
