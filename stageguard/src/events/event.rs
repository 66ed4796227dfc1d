//! Event payloads.

use crate::core::Payload;
use crate::utils::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// A stage attempt sequence began.
    Started,
    /// A stage is about to be retried.
    Progress,
    /// A stage succeeded.
    Completed,
    /// A stage attempt failed.
    Failed,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "STARTED"),
            Self::Progress => write!(f, "PROGRESS"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A lifecycle event delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Event kind.
    pub event_type: EventType,
    /// Run the event belongs to.
    pub run_id: String,
    /// Stage the event belongs to.
    pub stage_name: String,
    /// Event-specific data.
    #[serde(default)]
    pub data: Payload,
    /// When the event was created.
    pub timestamp: Timestamp,
}

impl PipelineEvent {
    /// Creates an event with empty data.
    #[must_use]
    pub fn new(event_type: EventType, run_id: impl Into<String>, stage_name: impl Into<String>) -> Self {
        Self {
            event_type,
            run_id: run_id.into(),
            stage_name: stage_name.into(),
            data: Payload::new(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a `STARTED` event.
    #[must_use]
    pub fn started(run_id: impl Into<String>, stage_name: impl Into<String>) -> Self {
        Self::new(EventType::Started, run_id, stage_name)
    }

    /// Creates a `PROGRESS` event.
    #[must_use]
    pub fn progress(run_id: impl Into<String>, stage_name: impl Into<String>) -> Self {
        Self::new(EventType::Progress, run_id, stage_name)
    }

    /// Creates a `COMPLETED` event.
    #[must_use]
    pub fn completed(run_id: impl Into<String>, stage_name: impl Into<String>) -> Self {
        Self::new(EventType::Completed, run_id, stage_name)
    }

    /// Creates a `FAILED` event.
    #[must_use]
    pub fn failed(run_id: impl Into<String>, stage_name: impl Into<String>) -> Self {
        Self::new(EventType::Failed, run_id, stage_name)
    }

    /// Adds a data field.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Looks up a data field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }
}
