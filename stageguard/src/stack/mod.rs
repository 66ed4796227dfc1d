//! Append-only pushdown history of pipeline states.
//!
//! This module provides:
//! - `StackEntry` and `EntryContext`: immutable history records
//! - `TransitionValidator`: pluggable legality checks for pushes
//! - `StateStack`: lookup, rollback and snapshot over the history

mod entry;
mod state_stack;
mod validator;

pub use entry::{EntryContext, StackEntry};
pub use state_stack::{StackSnapshot, StateStack};
pub use validator::{allowed_successors, DefaultTransitionValidator, TransitionValidator};
