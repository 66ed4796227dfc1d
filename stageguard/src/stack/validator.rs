//! Transition rules for state-stack pushes.

use super::{EntryContext, StackEntry};
use crate::core::PipelineState;
use crate::errors::InvalidTransitionError;
use std::fmt::Debug;

/// Decides whether a push is legal given the current history.
pub trait TransitionValidator: Send + Sync + Debug {
    /// Returns an error if `next` may not be appended after `history`.
    fn validate(
        &self,
        history: &[StackEntry],
        next: PipelineState,
        context: &EntryContext,
    ) -> Result<(), InvalidTransitionError>;
}

/// Legal successors of each state.
///
/// `None` is the empty stack.
#[must_use]
pub fn allowed_successors(from: Option<PipelineState>) -> &'static [PipelineState] {
    use PipelineState as S;

    match from {
        None => &[S::Initialized, S::StageStarted],
        Some(S::Initialized) => &[S::StageStarted, S::Terminal],
        Some(S::StageStarted) => &[S::StageCompleted, S::StageFailed, S::CircuitOpen],
        Some(S::StageCompleted) => &[S::StageStarted, S::Terminal],
        Some(S::StageFailed) => &[S::Recovering, S::StageStarted, S::CircuitOpen, S::Terminal],
        Some(S::Recovering) => &[S::StageCompleted, S::StageFailed],
        Some(S::CircuitOpen) => &[S::StageStarted, S::Terminal],
        Some(S::Terminal) => &[],
    }
}

/// The standard rule set: the transition table plus per-stage checks.
///
/// Completion, failure, recovery and circuit-open entries must belong to
/// the stage named by the most recent `StageStarted` entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransitionValidator;

impl TransitionValidator for DefaultTransitionValidator {
    fn validate(
        &self,
        history: &[StackEntry],
        next: PipelineState,
        context: &EntryContext,
    ) -> Result<(), InvalidTransitionError> {
        let from = history.last().map(|e| e.state);
        let stage = context.stage_name.as_deref();
        let reject = |reason: String| {
            let err = InvalidTransitionError::new(from, next, reason);
            match stage {
                Some(s) => err.with_stage(s),
                None => err,
            }
        };

        if !allowed_successors(from).contains(&next) {
            return Err(reject("transition not permitted".to_string()));
        }

        if next.is_stage_scoped() && stage.is_none() {
            return Err(reject("entry must name a stage".to_string()));
        }

        if matches!(
            next,
            PipelineState::StageCompleted
                | PipelineState::StageFailed
                | PipelineState::Recovering
                | PipelineState::CircuitOpen
        ) {
            let open = history
                .iter()
                .rev()
                .find(|e| e.state == PipelineState::StageStarted)
                .and_then(StackEntry::stage_name);

            match (open, stage) {
                (Some(open), Some(stage)) if open == stage => {}
                (Some(open), _) => {
                    return Err(reject(format!("stage '{open}' is the one in progress")));
                }
                (None, _) => return Err(reject("stage was never started".to_string())),
            }
        }

        Ok(())
    }
}
