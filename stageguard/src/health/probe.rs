//! Operating-system probes for process liveness and CPU usage.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

/// What a probe observed about a process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeStatus {
    /// Running, with CPU usage since the previous probe.
    Alive {
        /// CPU usage in percent of one core.
        cpu_percent: f64,
    },
    /// Terminated but not yet reaped by its parent.
    Zombie,
    /// No such process.
    Gone,
}

/// Inspects processes by handle.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessProbe: Send + Sync {
    /// Probes one process.
    fn probe(&self, handle_id: u32) -> ProbeStatus;
}

/// Linux probe reading `/proc/<pid>/stat`.
///
/// CPU usage is the change in user+system ticks between two probes of the
/// same handle divided by the wall time between them. The first probe of a
/// handle reports 0%.
#[derive(Debug)]
pub struct ProcfsProbe {
    root: PathBuf,
    ticks_per_second: f64,
    previous: Mutex<HashMap<u32, (u64, Instant)>>,
}

impl ProcfsProbe {
    /// Creates a probe over `/proc`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Creates a probe over an alternative procfs root.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            // USER_HZ is 100 on every mainstream Linux build.
            ticks_per_second: 100.0,
            previous: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the clock-tick rate (`getconf CLK_TCK`) used to read
    /// `utime`/`stime`.
    #[must_use]
    pub fn with_ticks_per_second(mut self, ticks_per_second: f64) -> Self {
        if ticks_per_second.is_finite() && ticks_per_second > 0.0 {
            self.ticks_per_second = ticks_per_second;
        }
        self
    }

    /// Returns the clock-tick rate.
    #[must_use]
    pub fn ticks_per_second(&self) -> f64 {
        self.ticks_per_second
    }

    fn cpu_percent(&self, handle_id: u32, ticks: u64) -> f64 {
        let now = Instant::now();
        let mut previous = self.previous.lock();
        let percent = previous.get(&handle_id).map_or(0.0, |&(prev_ticks, at)| {
            let wall = now.duration_since(at).as_secs_f64();
            if wall <= 0.0 {
                return 0.0;
            }
            #[allow(clippy::cast_precision_loss)]
            let cpu = ticks.saturating_sub(prev_ticks) as f64 / self.ticks_per_second;
            cpu / wall * 100.0
        });
        previous.insert(handle_id, (ticks, now));
        percent
    }
}

impl Default for ProcfsProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses the process state and user+system ticks out of a stat line.
///
/// The command name may contain spaces and parentheses, so fields are read
/// after the last `)`.
fn parse_stat(line: &str) -> Option<(char, u64)> {
    let rest = &line[line.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let state = fields.first()?.chars().next()?;
    // After the command: state is field 3, utime 14, stime 15.
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some((state, utime + stime))
}

impl ProcessProbe for ProcfsProbe {
    fn probe(&self, handle_id: u32) -> ProbeStatus {
        let path = self.root.join(handle_id.to_string()).join("stat");
        let Ok(line) = std::fs::read_to_string(&path) else {
            self.previous.lock().remove(&handle_id);
            return ProbeStatus::Gone;
        };

        match parse_stat(&line) {
            Some(('Z' | 'X' | 'x', _)) => ProbeStatus::Zombie,
            Some((_, ticks)) => ProbeStatus::Alive {
                cpu_percent: self.cpu_percent(handle_id, ticks),
            },
            None => ProbeStatus::Gone,
        }
    }
}
