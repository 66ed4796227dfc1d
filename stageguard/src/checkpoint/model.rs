//! Checkpoint values and the builder that accumulates them.

use crate::core::{ResultStatus, StageResult};
use crate::utils::{generate_uuid, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Overall status of a run as captured by a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// Some stages have not succeeded yet and none is currently failed.
    InProgress,
    /// Every stage succeeded.
    Succeeded,
    /// At least one stage's latest result is a failure.
    Failed,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// An immutable snapshot of every stage result in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique identifier of this snapshot.
    pub checkpoint_id: String,
    /// The run the snapshot belongs to.
    pub run_id: String,
    /// Number of stages in the run.
    pub total_stages: usize,
    /// Latest result per stage, in first-recorded order.
    pub stage_results: Vec<StageResult>,
    /// Derived run status.
    pub overall_status: OverallStatus,
    /// When the snapshot was built.
    pub created_at: Timestamp,
}

impl Checkpoint {
    /// Starts accumulating a checkpoint for a run.
    #[must_use]
    pub fn begin(run_id: impl Into<String>, total_stages: usize) -> CheckpointBuilder {
        CheckpointBuilder::new(run_id, total_stages)
    }

    /// Returns the recorded result for a stage.
    #[must_use]
    pub fn result_for(&self, stage_name: &str) -> Option<&StageResult> {
        self.stage_results
            .iter()
            .rev()
            .find(|r| r.stage_name == stage_name)
    }

    /// Returns the number of stages whose result is a success.
    #[must_use]
    pub fn completed_stages(&self) -> usize {
        self.stage_results.iter().filter(|r| r.is_success()).count()
    }

    /// Checks structural invariants a loaded checkpoint must satisfy.
    pub fn validate(&self) -> Result<(), String> {
        if self.run_id.is_empty() {
            return Err("run_id is empty".to_string());
        }
        if self.stage_results.len() > self.total_stages {
            return Err(format!(
                "{} stage results exceed total_stages {}",
                self.stage_results.len(),
                self.total_stages
            ));
        }
        let mut seen = HashSet::new();
        for result in &self.stage_results {
            if result.stage_name.is_empty() {
                return Err("stage result without a stage name".to_string());
            }
            if !seen.insert(result.stage_name.as_str()) {
                return Err(format!("duplicate result for stage '{}'", result.stage_name));
            }
            if !result.duration.is_finite() || result.duration < 0.0 {
                return Err(format!("invalid duration for stage '{}'", result.stage_name));
            }
        }
        if derive_status(self.total_stages, &self.stage_results) != self.overall_status {
            return Err(format!(
                "overall_status {} does not match stage results",
                self.overall_status
            ));
        }
        Ok(())
    }

    /// Computes what to do with each stage when resuming.
    #[must_use]
    pub fn resume_plan<I, S>(&self, stage_names: I) -> ResumePlan
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let actions = stage_names
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                (name.to_string(), self.resume_action(name))
            })
            .collect();

        ResumePlan { actions }
    }

    /// Decides what to do with one stage when resuming.
    #[must_use]
    pub fn resume_action(&self, stage_name: &str) -> ResumeAction {
        match self.result_for(stage_name) {
            Some(r) if r.status == ResultStatus::Success => ResumeAction::Skip(r.clone()),
            Some(r) => ResumeAction::Retry {
                from_attempt: r.retry_count,
            },
            None => ResumeAction::Run,
        }
    }
}

/// What the engine should do with one stage on resume.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeAction {
    /// The stage already succeeded; reuse its result.
    Skip(StageResult),
    /// The stage failed; continue its attempt count from `from_attempt`.
    Retry {
        /// Attempt number to resume from.
        from_attempt: u32,
    },
    /// The stage has no recorded result.
    Run,
}

/// Per-stage resume decisions, in pipeline order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePlan {
    /// `(stage_name, action)` pairs.
    pub actions: Vec<(String, ResumeAction)>,
}

impl ResumePlan {
    /// Returns the action for a stage.
    #[must_use]
    pub fn action_for(&self, stage_name: &str) -> Option<&ResumeAction> {
        self.actions
            .iter()
            .find(|(name, _)| name == stage_name)
            .map(|(_, action)| action)
    }

    /// Returns the first stage that still needs to execute.
    #[must_use]
    pub fn first_pending(&self) -> Option<&str> {
        self.actions
            .iter()
            .find(|(_, action)| !matches!(action, ResumeAction::Skip(_)))
            .map(|(name, _)| name.as_str())
    }

    /// Returns the number of stages that will be skipped.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.actions
            .iter()
            .filter(|(_, action)| matches!(action, ResumeAction::Skip(_)))
            .count()
    }
}

/// Accumulates stage results and builds immutable checkpoints.
///
/// Recording a result for a stage that already has one replaces it in
/// place, so each stage appears once with its latest outcome.
#[derive(Debug, Clone)]
pub struct CheckpointBuilder {
    run_id: String,
    total_stages: usize,
    stage_results: Vec<StageResult>,
}

impl CheckpointBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(run_id: impl Into<String>, total_stages: usize) -> Self {
        Self {
            run_id: run_id.into(),
            total_stages,
            stage_results: Vec::new(),
        }
    }

    /// Seeds a builder with the results of an earlier checkpoint.
    #[must_use]
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Self {
        Self {
            run_id: checkpoint.run_id.clone(),
            total_stages: checkpoint.total_stages,
            stage_results: checkpoint.stage_results.clone(),
        }
    }

    /// Records a stage result.
    #[must_use]
    pub fn record(mut self, result: StageResult) -> Self {
        self.record_mut(result);
        self
    }

    /// Records a stage result in place.
    pub fn record_mut(&mut self, result: StageResult) -> &mut Self {
        match self
            .stage_results
            .iter_mut()
            .find(|r| r.stage_name == result.stage_name)
        {
            Some(existing) => *existing = result,
            None => self.stage_results.push(result),
        }
        self
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Returns the results recorded so far.
    #[must_use]
    pub fn results(&self) -> &[StageResult] {
        &self.stage_results
    }

    /// Builds a checkpoint from the results recorded so far.
    ///
    /// The builder stays usable; each call yields a new checkpoint id.
    #[must_use]
    pub fn build(&self) -> Checkpoint {
        Checkpoint {
            checkpoint_id: generate_uuid().to_string(),
            run_id: self.run_id.clone(),
            total_stages: self.total_stages,
            stage_results: self.stage_results.clone(),
            overall_status: derive_status(self.total_stages, &self.stage_results),
            created_at: Utc::now(),
        }
    }
}

fn derive_status(total_stages: usize, results: &[StageResult]) -> OverallStatus {
    if results.iter().any(|r| r.status == ResultStatus::Failed) {
        OverallStatus::Failed
    } else if results.iter().filter(|r| r.is_success()).count() >= total_stages {
        OverallStatus::Succeeded
    } else {
        OverallStatus::InProgress
    }
}
