//! Table-driven process probe.

use crate::health::{ProbeStatus, ProcessProbe};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Probe answering from a table; unknown handles are [`ProbeStatus::Gone`].
#[derive(Debug, Default)]
pub struct StaticProbe {
    statuses: Mutex<HashMap<u32, ProbeStatus>>,
}

impl StaticProbe {
    /// Creates an empty probe.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status reported for a handle.
    pub fn set(&self, handle_id: u32, status: ProbeStatus) {
        self.statuses.lock().insert(handle_id, status);
    }

    /// Sets a handle to alive with the given CPU usage.
    #[must_use]
    pub fn with_alive(self, handle_id: u32, cpu_percent: f64) -> Self {
        self.set(handle_id, ProbeStatus::Alive { cpu_percent });
        self
    }
}

impl ProcessProbe for StaticProbe {
    fn probe(&self, handle_id: u32) -> ProbeStatus {
        self.statuses
            .lock()
            .get(&handle_id)
            .copied()
            .unwrap_or(ProbeStatus::Gone)
    }
}
