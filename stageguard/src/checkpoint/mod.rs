//! Durable point-in-time snapshots of stage results.
//!
//! This module provides:
//! - `Checkpoint` and `CheckpointBuilder`: immutable snapshots built incrementally
//! - `ResumePlan`: what to skip, retry or start when resuming a run
//! - `CheckpointStore`: persistence protocol
//! - `FileCheckpointStore`: one checksummed JSON file per run, atomic replace
//! - `InMemoryCheckpointStore`: for tests and ephemeral runs

mod file;
mod model;
mod store;

pub use file::{CheckpointEnvelope, FileCheckpointStore, CHECKPOINT_SCHEMA_VERSION};
pub use model::{Checkpoint, CheckpointBuilder, OverallStatus, ResumeAction, ResumePlan};
pub use store::{CheckpointStore, InMemoryCheckpointStore};
