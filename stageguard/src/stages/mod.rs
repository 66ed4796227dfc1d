//! Stage contract and helpers.
//!
//! A stage is an opaque unit of work. The engine hands it a payload and
//! stores whatever payload comes back; it never looks inside.

mod voting;

pub use voting::{Aggregation, Participant, Vote, VoteOutcome, VotingPool};

use crate::core::{Payload, StageError};
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for supervised stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage. Names must be unique within a pipeline.
    fn name(&self) -> &str;

    /// Executes the stage.
    ///
    /// # Arguments
    ///
    /// * `input` - The run input plus every upstream stage's latest result,
    ///   keyed by stage name
    ///
    /// # Returns
    ///
    /// The stage's opaque result payload, or a classified failure.
    async fn execute(&self, input: &Payload) -> Result<Payload, StageError>;
}

/// A stage backed by a synchronous closure.
pub struct FnStage<F>
where
    F: Fn(&Payload) -> Result<Payload, StageError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&Payload) -> Result<Payload, StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&Payload) -> Result<Payload, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&Payload) -> Result<Payload, StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: &Payload) -> Result<Payload, StageError> {
        (self.func)(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("double", |input: &Payload| {
            let n = input
                .get("n")
                .and_then(serde_json::Value::as_i64)
                .ok_or_else(|| StageError::validation("missing n"))?;
            let mut out = Payload::new();
            out.insert("n".to_string(), json!(n * 2));
            Ok(out)
        });

        assert_eq!(stage.name(), "double");

        let mut input = Payload::new();
        input.insert("n".to_string(), json!(21));
        let out = stage.execute(&input).await.unwrap();
        assert_eq!(out["n"], 42);

        let err = stage.execute(&Payload::new()).await.unwrap_err();
        assert_eq!(err, StageError::validation("missing n"));
    }
}
