//! Error types for the supervised execution core.
//!
//! The taxonomy separates failures the engine recovers from on its own
//! (retryable stage errors) from the ones it hands back to the caller:
//! exhausted retries, an open circuit, and illegal state-stack pushes.
//! Corrupt checkpoints never appear here; they degrade to a fresh start.

use crate::core::{AttemptRecord, PipelineState};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The main error type for stageguard operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A push onto the state stack was rejected by its transition validator.
    #[error("{0}")]
    InvalidTransition(#[from] InvalidTransitionError),

    /// A stage failed on every attempt its recovery strategy allowed.
    #[error(
        "Stage '{stage}' failed after {} attempt(s): {}",
        .attempts.len(),
        last_error_message(.attempts)
    )]
    Exhausted {
        /// The failing stage.
        stage: String,
        /// Every failed attempt, oldest first.
        attempts: Vec<AttemptRecord>,
    },

    /// The circuit breaker for a stage refused further attempts.
    #[error("Circuit open for stage '{stage}' after {consecutive_failures} consecutive failure(s), retry in {retry_after:?}")]
    CircuitOpen {
        /// The protected stage.
        stage: String,
        /// Consecutive failures recorded by the breaker.
        consecutive_failures: u32,
        /// Remaining cooldown before a trial attempt is permitted.
        retry_after: Duration,
        /// Attempts made in this call before the breaker tripped (empty when
        /// the call was refused up front).
        attempts: Vec<AttemptRecord>,
    },

    /// A checkpoint could not be persisted.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Supplied configuration failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn last_error_message(attempts: &[AttemptRecord]) -> String {
    attempts
        .last()
        .map_or_else(|| "no attempts recorded".to_string(), |a| a.error.to_string())
}

impl SupervisorError {
    /// Returns true if the error ends the current stage for good.
    ///
    /// Exhausted retries, an open circuit and illegal transitions are all
    /// fatal. Use [`SupervisorError::is_circuit_open`] to tell a known-bad
    /// stage apart from a stage that ran out of attempts.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }

    /// Returns true if repeating the failed operation may succeed.
    ///
    /// Only IO failures while persisting state qualify.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Returns true if a circuit breaker refused or stopped the stage.
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Returns the attempt history carried by the error, if any.
    #[must_use]
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            Self::Exhausted { attempts, .. } | Self::CircuitOpen { attempts, .. } => attempts,
            _ => &[],
        }
    }

    /// Returns the stage the error belongs to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Exhausted { stage, .. } | Self::CircuitOpen { stage, .. } => Some(stage),
            Self::InvalidTransition(e) => e.stage.as_deref(),
            _ => None,
        }
    }
}

/// Error raised when a state-stack push violates the transition rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransitionError {
    /// State on top of the stack before the push.
    pub from: Option<PipelineState>,
    /// State that was rejected.
    pub to: PipelineState,
    /// Stage named in the rejected entry's context.
    pub stage: Option<String>,
    /// Why the validator rejected the push.
    pub reason: String,
}

impl InvalidTransitionError {
    /// Creates a new invalid transition error.
    #[must_use]
    pub fn new(from: Option<PipelineState>, to: PipelineState, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            stage: None,
            reason: reason.into(),
        }
    }

    /// Sets the stage involved.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }
}

impl fmt::Display for InvalidTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid transition ")?;
        match self.from {
            Some(from) => write!(f, "{from}")?,
            None => write!(f, "<empty>")?,
        }
        write!(f, " -> {}", self.to)?;
        if let Some(ref stage) = self.stage {
            write!(f, " for stage '{stage}'")?;
        }
        write!(f, ": {}", self.reason)
    }
}

impl std::error::Error for InvalidTransitionError {}

/// Result alias used throughout the crate.
pub type Result<T, E = SupervisorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageError;

    fn attempt(n: u32, message: &str) -> AttemptRecord {
        AttemptRecord::new(n, StageError::transient(message), 0.5)
    }

    #[test]
    fn test_exhausted_message_uses_last_error() {
        let err = SupervisorError::Exhausted {
            stage: "review".to_string(),
            attempts: vec![attempt(0, "first"), attempt(1, "second")],
        };

        let msg = err.to_string();
        assert!(msg.contains("review"));
        assert!(msg.contains("2 attempt(s)"));
        assert!(msg.contains("second"));
        assert_eq!(err.attempts().len(), 2);
        assert_eq!(err.stage(), Some("review"));
    }

    #[test]
    fn test_classification() {
        let exhausted = SupervisorError::Exhausted {
            stage: "s".to_string(),
            attempts: vec![],
        };
        assert!(exhausted.is_fatal());

        let open = SupervisorError::CircuitOpen {
            stage: "s".to_string(),
            consecutive_failures: 3,
            retry_after: Duration::from_secs(10),
            attempts: vec![],
        };
        assert!(open.is_fatal());
        assert!(!open.is_retryable());
        assert!(open.is_circuit_open());
        assert!(!exhausted.is_circuit_open());

        let io: SupervisorError = std::io::Error::other("disk full").into();
        assert!(io.is_retryable());
        assert!(!io.is_fatal());

        let invalid: SupervisorError =
            InvalidTransitionError::new(None, PipelineState::StageCompleted, "no start").into();
        assert!(invalid.is_fatal());
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = InvalidTransitionError::new(
            Some(PipelineState::Initialized),
            PipelineState::StageCompleted,
            "stage was never started",
        )
        .with_stage("build");

        assert_eq!(
            err.to_string(),
            "Invalid transition initialized -> stage_completed for stage 'build': stage was never started"
        );
    }
}
