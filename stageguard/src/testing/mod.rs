//! Test doubles for supervised pipelines.
//!
//! This module provides:
//! - `ScriptedStage`: replays a fixed sequence of outcomes
//! - `AlwaysFailingStage`: fails every call with one error kind
//! - `StaticProbe`: a process probe answering from a table

mod probe;
mod stages;

pub use probe::StaticProbe;
pub use stages::{AlwaysFailingStage, ScriptedStage};
