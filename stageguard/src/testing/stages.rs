//! Scripted stages.

use crate::core::{ErrorKind, Payload, StageError};
use crate::stages::Stage;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A stage that replays queued outcomes, then falls back to a default.
///
/// The default outcome is a success whose payload names the stage and the
/// call number.
#[derive(Debug)]
pub struct ScriptedStage {
    name: String,
    script: Mutex<VecDeque<Result<Payload, StageError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<Payload>>,
}

impl ScriptedStage {
    /// Creates a stage with an empty script.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            delay: None,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Creates a stage that always succeeds.
    #[must_use]
    pub fn succeeding(name: impl Into<String>) -> Self {
        Self::new(name)
    }

    /// Creates a stage that fails `failures` times with transient errors, then succeeds.
    #[must_use]
    pub fn failing_then_succeeding(name: impl Into<String>, failures: usize) -> Self {
        let stage = Self::new(name);
        for n in 1..=failures {
            stage
                .script
                .lock()
                .push_back(Err(StageError::transient(format!("scripted failure {n}"))));
        }
        stage
    }

    /// Queues a success.
    #[must_use]
    pub fn then_ok(self, payload: Payload) -> Self {
        self.script.lock().push_back(Ok(payload));
        self
    }

    /// Queues a failure.
    #[must_use]
    pub fn then_err(self, error: StageError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Makes every call take `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the input of every call.
    #[must_use]
    pub fn inputs(&self) -> Vec<Payload> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: &Payload) -> Result<Payload, StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.inputs.lock().push(input.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| {
            let mut payload = Payload::new();
            payload.insert("stage".to_string(), json!(self.name));
            payload.insert("call".to_string(), json!(call));
            Ok(payload)
        })
    }
}

/// A stage that fails on every call.
#[derive(Debug)]
pub struct AlwaysFailingStage {
    name: String,
    kind: ErrorKind,
    calls: AtomicUsize,
}

impl AlwaysFailingStage {
    /// Creates a stage failing with `kind`.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            name: name.into(),
            kind,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for AlwaysFailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _input: &Payload) -> Result<Payload, StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Err(StageError::new(
            self.kind.clone(),
            format!("{} failed on call {call}", self.name),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_stage_replays_then_defaults() {
        let stage = ScriptedStage::failing_then_succeeding("build", 1)
            .then_err(StageError::validation("bad input"));

        assert!(stage.execute(&Payload::new()).await.is_err());
        let second = stage.execute(&Payload::new()).await.unwrap_err();
        assert_eq!(second.kind, ErrorKind::Validation);

        let third = stage.execute(&Payload::new()).await.unwrap();
        assert_eq!(third["stage"], "build");
        assert_eq!(third["call"], 3);
        assert_eq!(stage.calls(), 3);
        assert_eq!(stage.inputs().len(), 3);
    }

    #[tokio::test]
    async fn test_always_failing_stage() {
        let stage = AlwaysFailingStage::new("deploy", ErrorKind::Timeout);
        let err = stage.execute(&Payload::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(err.message, "deploy failed on call 1");
    }
}
