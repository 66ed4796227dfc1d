//! Span timing helper.

use tokio::time::Instant;
use tracing::debug;

/// Measures how long a named span of work took.
///
/// Backed by `tokio::time::Instant` so paused-clock tests see virtual time.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in seconds.
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_secs() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span, logs it and returns the duration in seconds.
    pub fn finish(self) -> f64 {
        let secs = self.elapsed_secs();
        debug!(span = %self.name, duration_ms = secs * 1000.0, "Span finished");
        secs
    }
}
