//! Per-stage execution statistics.

use crate::core::{PipelineState, StageResult};
use crate::stack::StateStack;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One finished stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Stage name.
    pub stage_name: String,
    /// Duration in seconds.
    pub duration: f64,
    /// Whether the execution succeeded.
    pub succeeded: bool,
}

impl ExecutionRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(stage_name: impl Into<String>, duration: f64, succeeded: bool) -> Self {
        Self {
            stage_name: stage_name.into(),
            duration,
            succeeded,
        }
    }

    /// Collects records for every completed or failed attempt in a stack.
    #[must_use]
    pub fn from_stack(stack: &StateStack) -> Vec<Self> {
        stack
            .entries()
            .iter()
            .filter_map(|entry| {
                let succeeded = match entry.state {
                    PipelineState::StageCompleted => true,
                    PipelineState::StageFailed => false,
                    _ => return None,
                };
                let stage = entry.stage_name()?;
                Some(Self::new(stage, entry.context.duration, succeeded))
            })
            .collect()
    }
}

impl From<&StageResult> for ExecutionRecord {
    fn from(result: &StageResult) -> Self {
        Self::new(result.stage_name.clone(), result.duration, result.is_success())
    }
}

/// Aggregate figures for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageStatistics {
    /// Number of executions seen.
    pub execution_count: usize,
    /// Mean duration in seconds.
    pub avg_duration: f64,
    /// Fraction of executions that failed, in `[0, 1]`.
    pub failure_rate: f64,
}

/// Groups records by stage and computes count, mean duration and failure rate.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn stage_statistics(records: &[ExecutionRecord]) -> BTreeMap<String, StageStatistics> {
    let mut totals: BTreeMap<&str, (usize, f64, usize)> = BTreeMap::new();
    for record in records {
        let entry = totals.entry(record.stage_name.as_str()).or_default();
        entry.0 += 1;
        entry.1 += record.duration;
        if !record.succeeded {
            entry.2 += 1;
        }
    }

    totals
        .into_iter()
        .map(|(stage, (count, total_duration, failures))| {
            let stats = if count == 0 {
                StageStatistics {
                    execution_count: 0,
                    avg_duration: 0.0,
                    failure_rate: 0.0,
                }
            } else {
                StageStatistics {
                    execution_count: count,
                    avg_duration: total_duration / count as f64,
                    failure_rate: failures as f64 / count as f64,
                }
            };
            (stage.to_string(), stats)
        })
        .collect()
}
