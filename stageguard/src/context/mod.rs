//! Per-run state and the registry of concurrent runs.
//!
//! Everything mutable that belongs to a run (its state stack, breakers and
//! checkpoint builder) lives in one [`RunContext`]. Runs never share one,
//! so concurrent runs need no cross-run locking.

mod registry;
mod run;

pub use registry::{RunHandle, RunRegistry};
pub use run::RunContext;
