//! Breakers for every stage of one run.

use super::{BreakerConfig, BreakerDecision, CircuitBreaker};
use crate::utils::{Clock, SystemClock};
use std::collections::HashMap;
use std::sync::Arc;

/// Circuit breakers keyed by `(run_id, stage_name)`, scoped to one run.
///
/// A breaker is created on a stage's first failure and the whole registry
/// is discarded when the run ends.
#[derive(Debug)]
pub struct BreakerRegistry {
    run_id: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    breakers: HashMap<(String, String), CircuitBreaker>,
}

impl BreakerRegistry {
    /// Creates an empty registry for a run.
    #[must_use]
    pub fn new(run_id: impl Into<String>, config: BreakerConfig) -> Self {
        Self::with_clock(run_id, config, Arc::new(SystemClock))
    }

    /// Creates an empty registry with an explicit clock.
    #[must_use]
    pub fn with_clock(run_id: impl Into<String>, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            run_id: run_id.into(),
            config,
            clock,
            breakers: HashMap::new(),
        }
    }

    fn key(&self, stage_name: &str) -> (String, String) {
        (self.run_id.clone(), stage_name.to_string())
    }

    /// Returns the breaker for a stage, if it has failed before.
    #[must_use]
    pub fn get(&self, stage_name: &str) -> Option<&CircuitBreaker> {
        self.breakers.get(&self.key(stage_name))
    }

    /// Consults the stage's breaker; stages without one are allowed.
    pub fn check(&mut self, stage_name: &str) -> BreakerDecision {
        let key = self.key(stage_name);
        self.breakers
            .get_mut(&key)
            .map_or(BreakerDecision::Allow, CircuitBreaker::check)
    }

    /// Returns true if the stage's breaker currently refuses attempts.
    #[must_use]
    pub fn should_trip(&self, stage_name: &str) -> bool {
        self.get(stage_name).is_some_and(CircuitBreaker::should_trip)
    }

    /// Records a success; a stage without a breaker needs none.
    pub fn record_success(&mut self, stage_name: &str) {
        let key = self.key(stage_name);
        if let Some(breaker) = self.breakers.get_mut(&key) {
            breaker.record_success();
        }
    }

    /// Records a failure, creating the breaker on first failure.
    ///
    /// Returns true if this failure opened the circuit.
    pub fn record_failure(&mut self, stage_name: &str) -> bool {
        let key = self.key(stage_name);
        let config = self.config.clone();
        let clock = self.clock.clone();
        self.breakers
            .entry(key)
            .or_insert_with(|| CircuitBreaker::with_clock(config, clock))
            .record_failure()
    }

    /// Returns the consecutive failures recorded for a stage.
    #[must_use]
    pub fn consecutive_failures(&self, stage_name: &str) -> u32 {
        self.get(stage_name)
            .map_or(0, |b| b.state().consecutive_failures)
    }

    /// Returns the run this registry belongs to.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Returns the number of stages with a breaker.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Returns true if no stage has failed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Drops every breaker; called when the run ends.
    pub fn clear(&mut self) {
        self.breakers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerPhase;

    #[test]
    fn test_created_on_first_failure() {
        let mut registry = BreakerRegistry::new("run-1", BreakerConfig::new(2, 30.0));
        assert!(registry.get("build").is_none());
        assert_eq!(registry.check("build"), BreakerDecision::Allow);

        registry.record_success("build");
        assert!(registry.is_empty());

        assert!(!registry.record_failure("build"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.consecutive_failures("build"), 1);
    }

    #[test]
    fn test_stages_are_independent() {
        let mut registry = BreakerRegistry::new("run-1", BreakerConfig::new(1, 30.0));
        assert!(registry.record_failure("build"));

        assert!(registry.should_trip("build"));
        assert!(!registry.should_trip("test"));
        assert_eq!(registry.check("test"), BreakerDecision::Allow);
        assert_eq!(
            registry.get("build").map(CircuitBreaker::phase),
            Some(BreakerPhase::Open)
        );
    }

    #[test]
    fn test_clear_discards_state() {
        let mut registry = BreakerRegistry::new("run-1", BreakerConfig::new(1, 30.0));
        registry.record_failure("build");
        registry.clear();

        assert!(!registry.should_trip("build"));
        assert_eq!(registry.run_id(), "run-1");
    }
}
