//! Retry policy, backoff math and runtime strategy adjustment.

use crate::stack::StateStack;
use crate::utils::duration_from_secs;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;

/// Retry, backoff and timeout policy for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryStrategy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in seconds.
    pub retry_delay_seconds: f64,
    /// Upper bound on any single backoff delay, in seconds.
    pub timeout_seconds: f64,
    /// Factor applied to the delay after each retry.
    pub backoff_multiplier: f64,
}

impl Default for RecoveryStrategy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_seconds: 1.0,
            timeout_seconds: 60.0,
            backoff_multiplier: 2.0,
        }
    }
}

impl RecoveryStrategy {
    /// Creates a strategy.
    #[must_use]
    pub fn new(
        max_retries: u32,
        retry_delay_seconds: f64,
        timeout_seconds: f64,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            retry_delay_seconds,
            timeout_seconds,
            backoff_multiplier,
        }
    }

    /// A strategy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_retry_delay(mut self, seconds: f64) -> Self {
        self.retry_delay_seconds = seconds;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Total executions the strategy permits, first attempt included.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before the `retry`-th retry (1-based).
    ///
    /// `retry_delay_seconds * backoff_multiplier^(retry - 1)`, capped at
    /// `timeout_seconds`. Retry 0 has no delay.
    #[must_use]
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let raw = self.retry_delay_seconds * self.backoff_multiplier.powi(exponent);
        let capped = if raw.is_finite() {
            raw.min(self.timeout_seconds)
        } else {
            self.timeout_seconds
        };
        duration_from_secs(capped)
    }

    /// Validates the strategy.
    pub fn validate(&self) -> Result<(), String> {
        if !self.retry_delay_seconds.is_finite() || self.retry_delay_seconds < 0.0 {
            return Err("retry_delay_seconds must be a non-negative number".to_string());
        }
        if !self.timeout_seconds.is_finite() || self.timeout_seconds <= 0.0 {
            return Err("timeout_seconds must be positive".to_string());
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err("backoff_multiplier must be at least 1.0".to_string());
        }
        Ok(())
    }
}

/// Adapts a stage's strategy from what earlier stages recorded.
///
/// Adjusters only read the stack. They are always applied to the stage's
/// base strategy, so repeated application does not compound.
pub trait StrategyAdjuster: Send + Sync + Debug {
    /// Returns a replacement strategy, or `None` to keep `base`.
    fn adjust(&self, stage_name: &str, base: &RecoveryStrategy, stack: &StateStack) -> Option<RecoveryStrategy>;
}

/// Settings for a [`QualityGate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGateConfig {
    /// Stage whose result carries the quality signal.
    pub upstream_stage: String,
    /// Numeric field read from the upstream result.
    #[serde(default = "default_field")]
    pub field: String,
    /// Signals strictly below this widen the downstream strategy.
    pub threshold: f64,
    /// Retries added when the gate fires.
    #[serde(default = "default_extra_retries")]
    pub extra_retries: u32,
    /// Factor applied to `timeout_seconds` when the gate fires.
    #[serde(default = "default_timeout_multiplier")]
    pub timeout_multiplier: f64,
    /// Stages the gate applies to. Empty means every other stage.
    #[serde(default)]
    pub applies_to: Vec<String>,
}

fn default_field() -> String {
    "score".to_string()
}

fn default_extra_retries() -> u32 {
    2
}

fn default_timeout_multiplier() -> f64 {
    2.0
}

impl QualityGateConfig {
    /// Creates a gate reading `score` from `upstream_stage`.
    #[must_use]
    pub fn new(upstream_stage: impl Into<String>, threshold: f64) -> Self {
        Self {
            upstream_stage: upstream_stage.into(),
            field: default_field(),
            threshold,
            extra_retries: default_extra_retries(),
            timeout_multiplier: default_timeout_multiplier(),
            applies_to: Vec::new(),
        }
    }

    /// Sets the field read from the upstream result.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    /// Sets the retries added when the gate fires.
    #[must_use]
    pub fn with_extra_retries(mut self, extra: u32) -> Self {
        self.extra_retries = extra;
        self
    }

    /// Restricts the gate to the given stages.
    #[must_use]
    pub fn applies_to<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.applies_to = stages.into_iter().map(Into::into).collect();
        self
    }

    /// Validates the settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.upstream_stage.is_empty() {
            return Err("quality_gate.upstream_stage must not be empty".to_string());
        }
        if !self.threshold.is_finite() {
            return Err("quality_gate.threshold must be a finite number".to_string());
        }
        if !self.timeout_multiplier.is_finite() || self.timeout_multiplier < 1.0 {
            return Err("quality_gate.timeout_multiplier must be at least 1.0".to_string());
        }
        Ok(())
    }
}

/// Widens retries and timeout when an upstream quality signal is low.
#[derive(Debug, Clone)]
pub struct QualityGate {
    config: QualityGateConfig,
}

impl QualityGate {
    /// Creates a gate.
    #[must_use]
    pub fn new(config: QualityGateConfig) -> Self {
        Self { config }
    }

    /// Returns the gate settings.
    #[must_use]
    pub fn config(&self) -> &QualityGateConfig {
        &self.config
    }

    fn covers(&self, stage_name: &str) -> bool {
        if stage_name == self.config.upstream_stage {
            return false;
        }
        self.config.applies_to.is_empty() || self.config.applies_to.iter().any(|s| s == stage_name)
    }
}

impl StrategyAdjuster for QualityGate {
    fn adjust(&self, stage_name: &str, base: &RecoveryStrategy, stack: &StateStack) -> Option<RecoveryStrategy> {
        if !self.covers(stage_name) {
            return None;
        }
        let signal = stack
            .get_latest_result(&self.config.upstream_stage)?
            .get(&self.config.field)?
            .as_f64()?;
        if signal >= self.config.threshold {
            return None;
        }

        debug!(
            stage = stage_name,
            upstream = %self.config.upstream_stage,
            signal,
            threshold = self.config.threshold,
            "Quality gate widened recovery strategy"
        );
        Some(RecoveryStrategy {
            max_retries: base.max_retries.saturating_add(self.config.extra_retries),
            timeout_seconds: base.timeout_seconds * self.config.timeout_multiplier,
            ..base.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Payload, PipelineState};
    use crate::stack::EntryContext;
    use serde_json::json;

    fn stack_with_score(score: f64) -> StateStack {
        let mut payload = Payload::new();
        payload.insert("score".to_string(), json!(score));
        let mut stack = StateStack::new();
        stack
            .push(PipelineState::StageStarted, EntryContext::for_stage("review"))
            .unwrap();
        stack
            .push(
                PipelineState::StageCompleted,
                EntryContext::for_stage("review").with_result(payload),
            )
            .unwrap();
        stack
    }

    #[test]
    fn test_backoff_delay_sequence() {
        let strategy = RecoveryStrategy::new(5, 1.0, 60.0, 2.0);
        assert_eq!(strategy.backoff_delay(0), Duration::ZERO);
        assert_eq!(strategy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(strategy.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(strategy.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(strategy.backoff_delay(4), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_delay_capped_at_timeout() {
        let strategy = RecoveryStrategy::new(20, 1.0, 10.0, 3.0);
        assert_eq!(strategy.backoff_delay(3), Duration::from_secs(9));
        assert_eq!(strategy.backoff_delay(4), Duration::from_secs(10));
        assert_eq!(strategy.backoff_delay(1000), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_delay_with_unbounded_values() {
        let strategy = RecoveryStrategy::new(5, f64::INFINITY, f64::INFINITY, 2.0);
        assert_eq!(strategy.backoff_delay(1), Duration::MAX);

        let strategy = RecoveryStrategy::new(5, 1e300, 1e301, 10.0);
        assert_eq!(strategy.backoff_delay(3), Duration::MAX);
    }

    #[test]
    fn test_max_attempts() {
        assert_eq!(RecoveryStrategy::default().max_attempts(), 4);
        assert_eq!(RecoveryStrategy::no_retry().max_attempts(), 1);
    }

    #[test]
    fn test_validate() {
        assert!(RecoveryStrategy::default().validate().is_ok());
        assert!(RecoveryStrategy::default().with_backoff_multiplier(0.5).validate().is_err());
        assert!(RecoveryStrategy::default().with_retry_delay(-1.0).validate().is_err());
        assert!(RecoveryStrategy::default().with_timeout(0.0).validate().is_err());
    }

    #[test]
    fn test_strategy_serde_defaults() {
        let strategy: RecoveryStrategy = serde_json::from_str(r#"{"max_retries": 7}"#).unwrap();
        assert_eq!(strategy.max_retries, 7);
        assert!((strategy.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_quality_gate_widens_on_low_score() {
        let gate = QualityGate::new(QualityGateConfig::new("review", 0.7));
        let base = RecoveryStrategy::new(3, 1.0, 30.0, 2.0);

        let widened = gate.adjust("implementation", &base, &stack_with_score(0.4)).unwrap();
        assert_eq!(widened.max_retries, 5);
        assert!((widened.timeout_seconds - 60.0).abs() < f64::EPSILON);
        assert!((widened.retry_delay_seconds - 1.0).abs() < f64::EPSILON);

        assert!(gate.adjust("implementation", &base, &stack_with_score(0.7)).is_none());
        assert!(gate.adjust("review", &base, &stack_with_score(0.1)).is_none());
    }

    #[test]
    fn test_quality_gate_needs_signal() {
        let gate = QualityGate::new(QualityGateConfig::new("review", 0.7).with_field("confidence"));
        let base = RecoveryStrategy::default();

        assert!(gate.adjust("implementation", &base, &StateStack::new()).is_none());
        assert!(gate.adjust("implementation", &base, &stack_with_score(0.1)).is_none());
    }

    #[test]
    fn test_quality_gate_applies_to() {
        let gate = QualityGate::new(QualityGateConfig::new("review", 0.7).applies_to(["deploy"]));
        let base = RecoveryStrategy::default();
        let stack = stack_with_score(0.2);

        assert!(gate.adjust("implementation", &base, &stack).is_none());
        assert!(gate.adjust("deploy", &base, &stack).is_some());
    }
}
