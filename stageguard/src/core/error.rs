//! Classified stage failures.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a stage failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A transient failure that may succeed on retry.
    Transient,
    /// The stage ran out of time.
    Timeout,
    /// The health monitor flagged the stage's process as hanging.
    Hung,
    /// The stage rejected its input.
    Validation,
    /// An unexpected internal error.
    Internal,
    /// A stage-specific classification.
    Other(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Timeout => write!(f, "timeout"),
            Self::Hung => write!(f, "hung"),
            Self::Validation => write!(f, "validation"),
            Self::Internal => write!(f, "internal"),
            Self::Other(kind) => write!(f, "{kind}"),
        }
    }
}

/// A classified failure raised by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct StageError {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Creates a hang error.
    #[must_use]
    pub fn hung(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Hung, message)
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Converts to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind.to_string(),
            "message": self.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = StageError::transient("connection reset");
        assert_eq!(err.to_string(), "transient: connection reset");

        let err = StageError::new(ErrorKind::Other("lint".to_string()), "3 warnings");
        assert_eq!(err.to_string(), "lint: 3 warnings");
    }

    #[test]
    fn test_serialize() {
        let err = StageError::timeout("took too long");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["message"], "took too long");

        let back: StageError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }
}
