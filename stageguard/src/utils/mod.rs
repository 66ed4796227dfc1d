//! Utility helpers for identifiers and clocks.

mod clock;

pub use clock::{seconds_between, Clock, ManualClock, SystemClock};

use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Generates a random identifier for checkpoints.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Generates a time-ordered run identifier.
#[must_use]
pub fn generate_run_id() -> String {
    Uuid::now_v7().to_string()
}

/// Converts seconds to a [`Duration`] without panicking.
///
/// Negative and NaN inputs give zero; infinite or overflowing inputs give
/// [`Duration::MAX`].
#[must_use]
pub fn duration_from_secs(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Returns true if `run_id` is safe to embed in a file name.
#[must_use]
pub fn is_valid_run_id(run_id: &str) -> bool {
    !run_id.is_empty()
        && run_id.len() <= 128
        && !run_id.starts_with('.')
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
