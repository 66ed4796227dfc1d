//! # Stageguard
//!
//! Supervised execution core for multi-stage delivery pipelines.
//!
//! Stageguard runs opaque, long-running stages under a fault-tolerance
//! policy and keeps enough state to survive crashes:
//!
//! - **State stack**: append-only pushdown history of pipeline states with rollback
//! - **Checkpoints**: atomic, checksummed snapshots of stage results for resume
//! - **Health monitoring**: hang detection and zombie reclamation for stage processes
//! - **Circuit breaking**: per-(run, stage) CLOSED/OPEN/HALF_OPEN protection
//! - **Recovery engine**: retries with exponential backoff and cross-stage feedback
//! - **Event notification**: fire-and-forget fan-out to passive observers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stageguard::prelude::*;
//!
//! let config = SupervisorConfig::from_json_file("supervisor.json")?;
//! let supervisor = Supervisor::new(config).await?;
//!
//! let stages: Vec<Arc<dyn Stage>> = vec![requirements, implementation, review];
//! let outcome = supervisor.run("run-42", &stages, Payload::new()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod breaker;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod health;
pub mod observability;
pub mod recovery;
pub mod stack;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::breaker::{BreakerConfig, BreakerDecision, BreakerPhase, CircuitBreaker};
    pub use crate::checkpoint::{
        Checkpoint, CheckpointBuilder, CheckpointStore, FileCheckpointStore,
        InMemoryCheckpointStore, OverallStatus,
    };
    pub use crate::config::SupervisorConfig;
    pub use crate::context::{RunContext, RunRegistry};
    pub use crate::core::{
        ErrorKind, Payload, PipelineState, ProcessHealthSample, ResultStatus, StageError,
        StageResult,
    };
    pub use crate::errors::SupervisorError;
    pub use crate::events::{EventNotifier, EventType, LoggingObserver, Observer, PipelineEvent};
    pub use crate::health::{HangThresholds, HealthMonitor, ProcessProbe};
    pub use crate::recovery::{PipelineOutcome, RecoveryEngine, RecoveryStrategy, Supervisor};
    pub use crate::stack::{StackEntry, StateStack};
    pub use crate::stages::{FnStage, Stage, VotingPool};
    pub use std::sync::Arc;
}
