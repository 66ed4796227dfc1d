//! Stack entries and their context bag.

use crate::core::{Payload, PipelineState, StageError};
use crate::utils::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Context carried by a stack entry.
///
/// The well-known keys are typed fields; anything else a caller wants to
/// attach goes into `extra` and is flattened on serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryContext {
    /// Stage the entry belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_name: Option<String>,
    /// Opaque success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,
    /// Classified failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StageError>,
    /// Zero-based attempt number.
    #[serde(default)]
    pub retry_count: u32,
    /// Attempt duration in seconds.
    #[serde(default)]
    pub duration: f64,
    /// Additional caller-defined keys.
    #[serde(flatten)]
    pub extra: Payload,
}

impl EntryContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context for a stage.
    #[must_use]
    pub fn for_stage(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: Some(stage_name.into()),
            ..Self::default()
        }
    }

    /// Sets the success payload.
    #[must_use]
    pub fn with_result(mut self, result: Payload) -> Self {
        self.result = Some(result);
        self
    }

    /// Sets the failure.
    #[must_use]
    pub fn with_error(mut self, error: StageError) -> Self {
        self.error = Some(error);
        self
    }

    /// Sets the attempt number.
    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    /// Adds a caller-defined key.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Looks up a key, well-known fields first.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        match key {
            "stage_name" => self.stage_name.clone().map(serde_json::Value::String),
            "result" => self.result.clone().map(serde_json::Value::Object),
            "error" => self.error.as_ref().map(StageError::to_json),
            "retry_count" => Some(serde_json::json!(self.retry_count)),
            "duration" => Some(serde_json::json!(self.duration)),
            other => self.extra.get(other).cloned(),
        }
    }
}

/// One immutable record on the state stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackEntry {
    /// The recorded state.
    pub state: PipelineState,
    /// When the entry was appended.
    pub timestamp: Timestamp,
    /// Stage name, result, error and bookkeeping.
    pub context: EntryContext,
}

impl StackEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(state: PipelineState, context: EntryContext) -> Self {
        Self {
            state,
            timestamp: Utc::now(),
            context,
        }
    }

    /// Returns the stage name, if any.
    #[must_use]
    pub fn stage_name(&self) -> Option<&str> {
        self.context.stage_name.as_deref()
    }

    /// Returns true if the entry belongs to `stage_name`.
    #[must_use]
    pub fn is_for(&self, stage_name: &str) -> bool {
        self.stage_name() == Some(stage_name)
    }

    /// Returns the success payload, if any.
    #[must_use]
    pub fn result(&self) -> Option<&Payload> {
        self.context.result.as_ref()
    }
}
