//! Supervisor configuration.
//!
//! Loaded from JSON by the embedding application, validated once, then
//! consumed by the supervisor as plain structs.

use crate::breaker::BreakerConfig;
use crate::errors::{Result, SupervisorError};
use crate::health::HangThresholds;
use crate::recovery::{QualityGateConfig, RecoveryStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level configuration for a [`Supervisor`](crate::recovery::Supervisor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Directory for checkpoint files. `None` keeps checkpoints in memory.
    pub checkpoint_dir: Option<PathBuf>,
    /// Circuit breaker settings.
    pub breaker: BreakerConfig,
    /// Hang detection thresholds.
    pub health: HangThresholds,
    /// Interval between background health samples, in milliseconds.
    pub sample_interval_ms: u64,
    /// Strategy for stages without their own entry.
    pub default_strategy: RecoveryStrategy,
    /// Per-stage strategies.
    pub stage_strategies: HashMap<String, RecoveryStrategy>,
    /// Optional cross-stage strategy adjustment.
    pub quality_gate: Option<QualityGateConfig>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: None,
            breaker: BreakerConfig::default(),
            health: HangThresholds::default(),
            sample_interval_ms: 5_000,
            default_strategy: RecoveryStrategy::default(),
            stage_strategies: HashMap::new(),
            quality_gate: None,
        }
    }
}

impl SupervisorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate().map_err(SupervisorError::Config)?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Sets the checkpoint directory.
    #[must_use]
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Sets the breaker settings.
    #[must_use]
    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Sets the hang thresholds.
    #[must_use]
    pub fn with_health(mut self, health: HangThresholds) -> Self {
        self.health = health;
        self
    }

    /// Sets the default strategy.
    #[must_use]
    pub fn with_default_strategy(mut self, strategy: RecoveryStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Sets the strategy for one stage.
    #[must_use]
    pub fn with_stage_strategy(mut self, stage_name: impl Into<String>, strategy: RecoveryStrategy) -> Self {
        self.stage_strategies.insert(stage_name.into(), strategy);
        self
    }

    /// Sets the quality gate.
    #[must_use]
    pub fn with_quality_gate(mut self, gate: QualityGateConfig) -> Self {
        self.quality_gate = Some(gate);
        self
    }

    /// Returns the strategy for a stage.
    #[must_use]
    pub fn strategy_for(&self, stage_name: &str) -> &RecoveryStrategy {
        self.stage_strategies
            .get(stage_name)
            .unwrap_or(&self.default_strategy)
    }

    /// Validates every section.
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.breaker.validate()?;
        self.health.validate()?;
        if self.sample_interval_ms == 0 {
            return Err("sample_interval_ms must be positive".to_string());
        }
        self.default_strategy
            .validate()
            .map_err(|e| format!("default_strategy: {e}"))?;
        for (stage, strategy) in &self.stage_strategies {
            strategy
                .validate()
                .map_err(|e| format!("stage_strategies.{stage}: {e}"))?;
        }
        if let Some(gate) = &self.quality_gate {
            gate.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SupervisorConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.breaker, BreakerConfig::default());
        assert_eq!(config.strategy_for("anything"), &RecoveryStrategy::default());
    }

    #[test]
    fn test_from_json_str() {
        let config = SupervisorConfig::from_json_str(
            r#"{
                "checkpoint_dir": "/var/lib/stageguard",
                "breaker": {"failure_threshold": 3, "cooldown_seconds": 30.0},
                "health": {"cpu_threshold": 95.0},
                "stage_strategies": {
                    "implementation": {"max_retries": 6, "timeout_seconds": 120.0}
                },
                "quality_gate": {"upstream_stage": "review", "threshold": 0.6}
            }"#,
        )
        .unwrap();

        assert_eq!(config.checkpoint_dir, Some(PathBuf::from("/var/lib/stageguard")));
        assert_eq!(config.breaker.failure_threshold, 3);
        assert!((config.health.duration_threshold - 600.0).abs() < f64::EPSILON);
        assert_eq!(config.strategy_for("implementation").max_retries, 6);
        assert_eq!(config.strategy_for("review").max_retries, 3);

        let gate = config.quality_gate.unwrap();
        assert_eq!(gate.field, "score");
        assert_eq!(gate.extra_retries, 2);
    }

    #[test]
    fn test_validation_errors() {
        let err = SupervisorConfig::from_json_str(r#"{"breaker": {"failure_threshold": 0}}"#).unwrap_err();
        assert!(matches!(err, SupervisorError::Config(_)));

        let err = SupervisorConfig::from_json_str(
            r#"{"stage_strategies": {"build": {"backoff_multiplier": 0.5}}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("stage_strategies.build"));

        let err = SupervisorConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, SupervisorError::Serialization(_)));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"sample_interval_ms": 250}}"#).unwrap();

        let config = SupervisorConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.sample_interval_ms, 250);

        let err = SupervisorConfig::from_json_file("/nonexistent/stageguard.json").unwrap_err();
        assert!(matches!(err, SupervisorError::Io(_)));
    }

    #[test]
    fn test_builders() {
        let config = SupervisorConfig::new()
            .with_checkpoint_dir("/tmp/cp")
            .with_breaker(BreakerConfig::new(2, 1.0))
            .with_stage_strategy("deploy", RecoveryStrategy::no_retry())
            .with_quality_gate(QualityGateConfig::new("review", 0.5));

        assert_eq!(config.strategy_for("deploy").max_retries, 0);
        assert!(config.validate().is_ok());
    }
}
