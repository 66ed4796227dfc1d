//! Pipeline state and attempt phase enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A state recorded on the state stack.
///
/// Carries no payload; the stage name, result and error live in the
/// entry's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// The run was created.
    Initialized,
    /// A stage attempt sequence began.
    StageStarted,
    /// A stage attempt succeeded.
    StageCompleted,
    /// A stage attempt failed.
    StageFailed,
    /// The engine is about to retry a failed stage.
    Recovering,
    /// The circuit breaker stopped a stage.
    CircuitOpen,
    /// The run finished.
    Terminal,
}

impl PipelineState {
    /// Every state, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Initialized,
        Self::StageStarted,
        Self::StageCompleted,
        Self::StageFailed,
        Self::Recovering,
        Self::CircuitOpen,
        Self::Terminal,
    ];

    /// Returns true if nothing may follow this state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }

    /// Returns true if entries in this state must name a stage.
    #[must_use]
    pub fn is_stage_scoped(&self) -> bool {
        matches!(
            self,
            Self::StageStarted
                | Self::StageCompleted
                | Self::StageFailed
                | Self::Recovering
                | Self::CircuitOpen
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::StageStarted => write!(f, "stage_started"),
            Self::StageCompleted => write!(f, "stage_completed"),
            Self::StageFailed => write!(f, "stage_failed"),
            Self::Recovering => write!(f, "recovering"),
            Self::CircuitOpen => write!(f, "circuit_open"),
            Self::Terminal => write!(f, "terminal"),
        }
    }
}

/// Sub-states of one stage's attempt sequence.
///
/// `Pending -> Running -> {Succeeded | FailedRetryable -> Running | FailedFatal | CircuitOpen}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    /// Not started yet.
    #[default]
    Pending,
    /// An attempt is executing.
    Running,
    /// The last attempt succeeded.
    Succeeded,
    /// The last attempt failed and another is allowed.
    FailedRetryable,
    /// Retries are exhausted.
    FailedFatal,
    /// The breaker refused or stopped the sequence.
    CircuitOpen,
}

impl AttemptPhase {
    /// Returns true if the sequence is over.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::FailedFatal | Self::CircuitOpen)
    }

    /// Returns true if `next` is a legal successor of this phase.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::CircuitOpen | Self::Succeeded),
            Self::Running => matches!(
                next,
                Self::Succeeded | Self::FailedRetryable | Self::FailedFatal | Self::CircuitOpen
            ),
            Self::FailedRetryable => matches!(next, Self::Running),
            Self::Succeeded | Self::FailedFatal | Self::CircuitOpen => false,
        }
    }
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::FailedRetryable => write!(f, "failed_retryable"),
            Self::FailedFatal => write!(f, "failed_fatal"),
            Self::CircuitOpen => write!(f, "circuit_open"),
        }
    }
}
