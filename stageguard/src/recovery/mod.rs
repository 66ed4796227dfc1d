//! Supervised stage execution.
//!
//! This module provides:
//! - `RecoveryStrategy`: retry, backoff and timeout policy
//! - `StrategyAdjuster` / `QualityGate`: cross-stage strategy feedback
//! - `RecoveryEngine`: the retry loop around one stage and a whole pipeline
//! - `Supervisor`: configuration, checkpoint store and run registry wired together

mod engine;
mod strategy;
mod supervisor;


pub use engine::{PipelineOutcome, RecoveryEngine};
pub use strategy::{QualityGate, QualityGateConfig, RecoveryStrategy, StrategyAdjuster};
pub use supervisor::Supervisor;
