//! The three-phase breaker state machine.

use crate::utils::{duration_from_secs, seconds_between, Clock, SystemClock, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a trial attempt.
    pub cooldown_seconds: f64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_seconds: 60.0,
        }
    }
}

impl BreakerConfig {
    /// Creates a new breaker config.
    #[must_use]
    pub fn new(failure_threshold: u32, cooldown_seconds: f64) -> Self {
        Self {
            failure_threshold,
            cooldown_seconds,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be >= 1".to_string());
        }
        if !self.cooldown_seconds.is_finite() || self.cooldown_seconds < 0.0 {
            return Err("cooldown_seconds must be a non-negative number".to_string());
        }
        Ok(())
    }
}

/// Breaker phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerPhase {
    /// Attempts permitted.
    #[default]
    Closed,
    /// Attempts refused until the cooldown elapses.
    Open,
    /// One trial attempt permitted.
    HalfOpen,
}

impl fmt::Display for BreakerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Mutable breaker record for one (run, stage).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    /// Current phase.
    pub phase: BreakerPhase,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// When the circuit last opened.
    pub opened_at: Option<Timestamp>,
    /// Successes observed while half-open.
    pub success_count_in_half_open: u32,
    /// True while the half-open trial attempt is outstanding.
    pub trial_in_flight: bool,
}

/// Result of consulting the breaker before an attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BreakerDecision {
    /// Closed circuit, attempt normally.
    Allow,
    /// Half-open circuit, this is the single trial attempt.
    AllowTrial,
    /// Open circuit, fail fast.
    Reject {
        /// Remaining cooldown.
        retry_after: Duration,
    },
}

impl BreakerDecision {
    /// Returns true if an attempt may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Reject { .. })
    }
}

/// Circuit breaker guarding one stage within one run.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: CircuitBreakerState,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Creates a closed breaker using the system clock.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a closed breaker with an explicit clock.
    #[must_use]
    pub fn with_clock(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            state: CircuitBreakerState::default(),
            clock,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> BreakerPhase {
        self.state.phase
    }

    /// Returns the full state record.
    #[must_use]
    pub fn state(&self) -> &CircuitBreakerState {
        &self.state
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Returns true if attempts should currently be refused.
    ///
    /// Pure: reads the phase and counters, never mutates. Cooldown expiry is
    /// applied by [`CircuitBreaker::check`].
    #[must_use]
    pub fn should_trip(&self) -> bool {
        match self.state.phase {
            BreakerPhase::Closed => self.state.consecutive_failures >= self.config.failure_threshold,
            BreakerPhase::Open => true,
            BreakerPhase::HalfOpen => self.state.trial_in_flight,
        }
    }

    /// Returns true if the open-phase cooldown has elapsed.
    #[must_use]
    pub fn cooldown_elapsed(&self) -> bool {
        self.remaining_cooldown().is_zero()
    }

    /// Returns the remaining cooldown (zero unless open).
    #[must_use]
    pub fn remaining_cooldown(&self) -> Duration {
        match (self.state.phase, self.state.opened_at) {
            (BreakerPhase::Open, Some(opened_at)) => {
                let elapsed = seconds_between(opened_at, self.clock.now());
                let remaining = (self.config.cooldown_seconds - elapsed).max(0.0);
                duration_from_secs(remaining)
            }
            _ => Duration::ZERO,
        }
    }

    /// Consults the breaker before an attempt.
    ///
    /// Moves OPEN to HALF_OPEN once the cooldown has elapsed and hands out
    /// the single trial slot.
    pub fn check(&mut self) -> BreakerDecision {
        match self.state.phase {
            BreakerPhase::Closed => BreakerDecision::Allow,
            BreakerPhase::Open => {
                let retry_after = self.remaining_cooldown();
                if !retry_after.is_zero() {
                    return BreakerDecision::Reject { retry_after };
                }
                self.state.phase = BreakerPhase::HalfOpen;
                self.state.success_count_in_half_open = 0;
                self.state.trial_in_flight = true;
                tracing::debug!(failures = self.state.consecutive_failures, "Circuit half-open");
                BreakerDecision::AllowTrial
            }
            BreakerPhase::HalfOpen => {
                if self.state.trial_in_flight {
                    BreakerDecision::Reject {
                        retry_after: Duration::ZERO,
                    }
                } else {
                    self.state.trial_in_flight = true;
                    BreakerDecision::AllowTrial
                }
            }
        }
    }

    /// Records a successful attempt.
    pub fn record_success(&mut self) {
        if self.state.phase == BreakerPhase::HalfOpen {
            self.state.success_count_in_half_open += 1;
            tracing::debug!("Circuit closed after successful trial");
        }
        self.state = CircuitBreakerState::default();
    }

    /// Records a failed attempt. Returns true if this call opened the circuit.
    pub fn record_failure(&mut self) -> bool {
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);

        match self.state.phase {
            BreakerPhase::Closed => {
                if self.state.consecutive_failures >= self.config.failure_threshold {
                    self.open();
                    return true;
                }
                false
            }
            BreakerPhase::HalfOpen => {
                self.open();
                true
            }
            BreakerPhase::Open => false,
        }
    }

    fn open(&mut self) {
        self.state.phase = BreakerPhase::Open;
        self.state.opened_at = Some(self.clock.now());
        self.state.trial_in_flight = false;
        self.state.success_count_in_half_open = 0;
        tracing::warn!(
            failures = self.state.consecutive_failures,
            cooldown_seconds = self.config.cooldown_seconds,
            "Circuit opened"
        );
    }
}
