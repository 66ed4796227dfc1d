//! Immutable execution records.

use super::StageError;
use crate::utils::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque key/value payload passed to and returned by stages.
///
/// The core stores and retrieves payloads but never interprets their fields.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Outcome status of a recorded stage result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// The stage succeeded.
    Success,
    /// The stage failed.
    Failed,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The recorded outcome of one stage, as stored in a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name.
    pub stage_name: String,
    /// Success or failure.
    pub status: ResultStatus,
    /// Opaque success payload (empty for failures).
    #[serde(default)]
    pub payload: Payload,
    /// Duration of the recorded attempt in seconds.
    pub duration: f64,
    /// Zero-based attempt number that produced this result.
    pub retry_count: u32,
    /// When the result was recorded.
    pub recorded_at: Timestamp,
    /// Classified failure for failed results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StageError>,
}

impl StageResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        stage_name: impl Into<String>,
        payload: Payload,
        duration: f64,
        retry_count: u32,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: ResultStatus::Success,
            payload,
            duration,
            retry_count,
            recorded_at: Utc::now(),
            error: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(
        stage_name: impl Into<String>,
        error: StageError,
        duration: f64,
        retry_count: u32,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: ResultStatus::Failed,
            payload: Payload::new(),
            duration,
            retry_count,
            recorded_at: Utc::now(),
            error: Some(error),
        }
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

/// One failed attempt, kept for the error history handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Zero-based attempt number.
    pub attempt: u32,
    /// The classified failure.
    pub error: StageError,
    /// When the failure was observed.
    pub failed_at: Timestamp,
    /// How long the attempt ran, in seconds.
    pub duration: f64,
}

impl AttemptRecord {
    /// Creates a new attempt record stamped with the current time.
    #[must_use]
    pub fn new(attempt: u32, error: StageError, duration: f64) -> Self {
        Self {
            attempt,
            error,
            failed_at: Utc::now(),
            duration,
        }
    }
}

/// A point-in-time health sample of a stage-spawned process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessHealthSample {
    /// OS process identifier.
    pub handle_id: u32,
    /// CPU usage since the previous poll, in percent of one core.
    pub cpu_percent: f64,
    /// Seconds since the handle was registered.
    pub elapsed_seconds: f64,
    /// When the sample was taken.
    pub last_seen: Timestamp,
}

impl ProcessHealthSample {
    /// Creates a sample stamped with the current time.
    #[must_use]
    pub fn new(handle_id: u32, cpu_percent: f64, elapsed_seconds: f64) -> Self {
        Self {
            handle_id,
            cpu_percent,
            elapsed_seconds,
            last_seen: Utc::now(),
        }
    }
}
