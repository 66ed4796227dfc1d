//! The state stack itself.

use super::{DefaultTransitionValidator, EntryContext, StackEntry, TransitionValidator};
use crate::core::{Payload, PipelineState};
use crate::errors::InvalidTransitionError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// A full copy of the stack's entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackSnapshot {
    /// Entries, oldest first.
    pub entries: Vec<StackEntry>,
}

impl StackSnapshot {
    /// Returns the number of entries captured.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Append-only history of pipeline states for one run.
///
/// Entries are never modified once pushed. The only structural change is
/// truncation from the top via [`StateStack::rollback_to`] or
/// [`StateStack::restore`].
#[derive(Debug, Clone)]
pub struct StateStack {
    entries: Vec<StackEntry>,
    validator: Option<Arc<dyn TransitionValidator>>,
}

impl StateStack {
    /// Creates a stack guarded by [`DefaultTransitionValidator`], seeded
    /// with an `Initialized` entry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_validator(Arc::new(DefaultTransitionValidator))
    }

    /// Creates a stack guarded by `validator`, seeded with an `Initialized` entry.
    #[must_use]
    pub fn with_validator(validator: Arc<dyn TransitionValidator>) -> Self {
        Self {
            entries: vec![StackEntry::new(
                PipelineState::Initialized,
                EntryContext::new(),
            )],
            validator: Some(validator),
        }
    }

    /// Creates an empty stack that accepts any push.
    #[must_use]
    pub fn unvalidated() -> Self {
        Self {
            entries: Vec::new(),
            validator: None,
        }
    }

    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransitionError` if the validator rejects the move.
    pub fn push(
        &mut self,
        state: PipelineState,
        context: EntryContext,
    ) -> Result<&StackEntry, InvalidTransitionError> {
        if let Some(ref validator) = self.validator {
            validator.validate(&self.entries, state, &context)?;
        }

        tracing::trace!(
            state = %state,
            stage = context.stage_name.as_deref().unwrap_or("-"),
            depth = self.entries.len() + 1,
            "State pushed"
        );

        self.entries.push(StackEntry::new(state, context));
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the top entry.
    #[must_use]
    pub fn peek(&self) -> Option<&StackEntry> {
        self.entries.last()
    }

    /// Returns the state on top of the stack.
    #[must_use]
    pub fn current_state(&self) -> Option<PipelineState> {
        self.peek().map(|e| e.state)
    }

    /// Returns all entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    /// Returns the entries for one stage, oldest first.
    pub fn entries_for<'a>(&'a self, stage_name: &'a str) -> impl Iterator<Item = &'a StackEntry> + 'a {
        self.entries.iter().filter(move |e| e.is_for(stage_name))
    }

    /// Returns the most recent entry for a stage.
    #[must_use]
    pub fn latest_entry_for(&self, stage_name: &str) -> Option<&StackEntry> {
        self.entries.iter().rev().find(|e| e.is_for(stage_name))
    }

    /// Returns the failed entries for a stage, oldest first.
    #[must_use]
    pub fn attempt_history(&self, stage_name: &str) -> Vec<&StackEntry> {
        self.entries
            .iter()
            .filter(|e| e.state == PipelineState::StageFailed && e.is_for(stage_name))
            .collect()
    }

    /// Returns the authoritative result for a stage.
    ///
    /// Scans newest to oldest and takes the first entry for the stage that
    /// carries a result. Failures are skipped, so a later successful retry
    /// always supersedes earlier failures.
    #[must_use]
    pub fn get_latest_result(&self, stage_name: &str) -> Option<&Payload> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.is_for(stage_name))
            .find_map(StackEntry::result)
    }

    /// Lazily yields `(stage_name, result)` once per stage, newest result wins.
    ///
    /// Single reverse scan with a seen-set; stages that never produced a
    /// result are not yielded.
    pub fn iter_latest_results(&self) -> impl Iterator<Item = (&str, &Payload)> + '_ {
        let mut seen = HashSet::new();
        self.entries.iter().rev().filter_map(move |e| {
            let stage = e.stage_name()?;
            let result = e.result()?;
            seen.insert(stage).then_some((stage, result))
        })
    }

    /// Collects the latest result of every stage that has one.
    #[must_use]
    pub fn get_all_latest_results(&self) -> BTreeMap<String, Payload> {
        self.iter_latest_results()
            .map(|(stage, result)| (stage.to_string(), result.clone()))
            .collect()
    }

    /// Removes entries from the top until `predicate` matches the top entry
    /// or the stack is empty.
    ///
    /// Returns the removed entries, oldest first.
    pub fn rollback_to<P>(&mut self, predicate: P) -> Vec<StackEntry>
    where
        P: Fn(&StackEntry) -> bool,
    {
        let keep = self
            .entries
            .iter()
            .rposition(|e| predicate(e))
            .map_or(0, |idx| idx + 1);
        let removed = self.entries.split_off(keep);

        if !removed.is_empty() {
            tracing::debug!(
                removed = removed.len(),
                depth = self.entries.len(),
                "State stack rolled back"
            );
        }

        removed
    }

    /// Takes a full copy of the stack.
    #[must_use]
    pub fn snapshot(&self) -> StackSnapshot {
        StackSnapshot {
            entries: self.entries.clone(),
        }
    }

    /// Replaces the stack contents with a snapshot.
    pub fn restore(&mut self, snapshot: StackSnapshot) {
        self.entries = snapshot.entries;
    }
}

impl Default for StateStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn payload(key: &str, value: serde_json::Value) -> Payload {
        let mut p = Payload::new();
        p.insert(key.to_string(), value);
        p
    }

    fn start(stack: &mut StateStack, stage: &str) {
        stack
            .push(PipelineState::StageStarted, EntryContext::for_stage(stage))
            .unwrap();
    }

    fn complete(stack: &mut StateStack, stage: &str, result: Payload, attempt: u32) {
        stack
            .push(
                PipelineState::StageCompleted,
                EntryContext::for_stage(stage)
                    .with_result(result)
                    .with_retry_count(attempt),
            )
            .unwrap();
    }

    fn fail(stack: &mut StateStack, stage: &str, attempt: u32) {
        stack
            .push(
                PipelineState::StageFailed,
                EntryContext::for_stage(stage)
                    .with_error(StageError::transient("boom"))
                    .with_retry_count(attempt),
            )
            .unwrap();
    }

    fn recover(stack: &mut StateStack, stage: &str) {
        stack
            .push(PipelineState::Recovering, EntryContext::for_stage(stage))
            .unwrap();
    }

    #[test]
    fn test_new_stack_is_initialized() {
        let stack = StateStack::new();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.current_state(), Some(PipelineState::Initialized));
    }

    #[test]
    fn test_push_rejects_completion_without_start() {
        let mut stack = StateStack::new();
        let err = stack
            .push(
                PipelineState::StageCompleted,
                EntryContext::for_stage("build").with_result(Payload::new()),
            )
            .unwrap_err();

        assert_eq!(err.to, PipelineState::StageCompleted);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_unvalidated_accepts_anything() {
        let mut stack = StateStack::unvalidated();
        assert!(stack.is_empty());
        stack
            .push(PipelineState::StageCompleted, EntryContext::for_stage("x"))
            .unwrap();
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_latest_result_skips_failures() {
        let mut stack = StateStack::new();
        start(&mut stack, "review");
        fail(&mut stack, "review", 0);
        recover(&mut stack, "review");
        fail(&mut stack, "review", 1);
        recover(&mut stack, "review");
        complete(&mut stack, "review", payload("score", json!(0.9)), 2);

        assert_eq!(
            stack.get_latest_result("review"),
            Some(&payload("score", json!(0.9)))
        );
        assert_eq!(stack.attempt_history("review").len(), 2);
        assert_eq!(
            stack.latest_entry_for("review").unwrap().state,
            PipelineState::StageCompleted
        );
    }

    #[test]
    fn test_attempt_history_outlives_stage_name() {
        let mut stack = StateStack::new();
        start(&mut stack, "build");
        fail(&mut stack, "build", 0);
        recover(&mut stack, "build");
        complete(&mut stack, "build", payload("v", json!(1)), 1);

        let failed = {
            let name = String::from("build");
            stack.attempt_history(&name)
        };
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].context.retry_count, 0);

        let states: Vec<_> = stack.entries_for("build").map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![
                PipelineState::StageStarted,
                PipelineState::StageFailed,
                PipelineState::Recovering,
                PipelineState::StageCompleted
            ]
        );
    }

    #[test]
    fn test_latest_result_after_trailing_failure() {
        let mut stack = StateStack::new();
        start(&mut stack, "build");
        complete(&mut stack, "build", payload("v", json!(1)), 0);
        start(&mut stack, "build");
        fail(&mut stack, "build", 0);

        assert_eq!(stack.get_latest_result("build"), Some(&payload("v", json!(1))));
    }

    #[test]
    fn test_latest_result_none_when_only_failures() {
        let mut stack = StateStack::new();
        start(&mut stack, "deploy");
        fail(&mut stack, "deploy", 0);

        assert_eq!(stack.get_latest_result("deploy"), None);
        assert_eq!(stack.get_latest_result("unknown"), None);
    }

    #[test]
    fn test_all_latest_results_one_per_stage() {
        let mut stack = StateStack::new();
        start(&mut stack, "plan");
        complete(&mut stack, "plan", payload("v", json!(1)), 0);
        start(&mut stack, "build");
        fail(&mut stack, "build", 0);
        recover(&mut stack, "build");
        complete(&mut stack, "build", payload("v", json!(2)), 1);
        start(&mut stack, "plan");
        complete(&mut stack, "plan", payload("v", json!(3)), 0);

        let all = stack.get_all_latest_results();
        assert_eq!(all.len(), 2);
        for (stage, result) in &all {
            assert_eq!(stack.get_latest_result(stage), Some(result));
        }
        assert_eq!(all["plan"], payload("v", json!(3)));
        assert_eq!(stack.iter_latest_results().count(), 2);
    }

    #[test]
    fn test_rollback_to_predicate() {
        let mut stack = StateStack::new();
        start(&mut stack, "plan");
        complete(&mut stack, "plan", Payload::new(), 0);
        start(&mut stack, "build");
        fail(&mut stack, "build", 0);

        let removed = stack.rollback_to(|e| e.state == PipelineState::StageCompleted);

        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].state, PipelineState::StageStarted);
        assert_eq!(stack.current_state(), Some(PipelineState::StageCompleted));
        assert_eq!(stack.get_latest_result("build"), None);
    }

    #[test]
    fn test_rollback_without_match_empties_stack() {
        let mut stack = StateStack::new();
        start(&mut stack, "plan");

        let removed = stack.rollback_to(|e| e.state == PipelineState::Terminal);
        assert_eq!(removed.len(), 2);
        assert!(stack.is_empty());

        // An emptied stack can be restarted.
        start(&mut stack, "plan");
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_rollback_when_top_matches_is_noop() {
        let mut stack = StateStack::new();
        let removed = stack.rollback_to(|e| e.state == PipelineState::Initialized);
        assert!(removed.is_empty());
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut stack = StateStack::new();
        start(&mut stack, "plan");
        let snapshot = stack.snapshot();

        complete(&mut stack, "plan", payload("v", json!(1)), 0);
        assert_eq!(stack.len(), 3);

        stack.restore(snapshot.clone());
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.snapshot(), snapshot);
        assert_eq!(stack.current_state(), Some(PipelineState::StageStarted));
    }
}
