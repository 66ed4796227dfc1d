//! Per-(run, stage) circuit breaking.
//!
//! ```text
//! Closed    -> Open:      consecutive_failures reaches failure_threshold
//! Open      -> HalfOpen:  cooldown elapsed, checked on the next attempt
//! HalfOpen  -> Closed:    the single trial attempt succeeds
//! HalfOpen  -> Open:      the trial attempt fails (opened_at reset)
//! ```

mod circuit_breaker;
mod registry;

pub use circuit_breaker::{
    BreakerConfig, BreakerDecision, BreakerPhase, CircuitBreaker, CircuitBreakerState,
};
pub use registry::BreakerRegistry;
