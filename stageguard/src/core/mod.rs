//! Core value types shared by every component.
//!
//! This module contains:
//! - `PipelineState`: tagged states recorded on the state stack
//! - `AttemptPhase`: sub-states of a single stage attempt sequence
//! - `StageError`: classified stage failure
//! - `StageResult`, `AttemptRecord`, `ProcessHealthSample`: immutable records

mod error;
mod record;
mod state;

pub use error::{ErrorKind, StageError};
pub use record::{AttemptRecord, Payload, ProcessHealthSample, ResultStatus, StageResult};
pub use state::{AttemptPhase, PipelineState};
