//! Bounded fan-out for stages that collect several independent opinions.
//!
//! One task per participant, all started together. A participant that
//! errors, panics or overruns its timeout contributes the pool's fallback
//! vote instead; the others are unaffected. Aggregation only runs once
//! every task has finished.

use crate::core::{Payload, StageError};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One voter in a [`VotingPool`].
#[async_trait]
pub trait Participant: Send + Sync + Debug {
    /// Returns the participant's name.
    fn name(&self) -> &str;

    /// Produces a numeric vote for the input.
    async fn vote(&self, input: &Payload) -> Result<f64, StageError>;
}

/// How votes are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Arithmetic mean.
    #[default]
    Average,
    /// Middle value; mean of the two middle values for even counts.
    Median,
    /// Most frequent value; ties go to the smallest.
    Majority,
}

impl Aggregation {
    /// Combines values. Returns `None` when there is nothing to combine.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        match self {
            Self::Average => Some(sorted.iter().sum::<f64>() / sorted.len() as f64),
            Self::Median => {
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
                } else {
                    Some(sorted[mid])
                }
            }
            Self::Majority => {
                let mut best = (sorted[0], 0_usize);
                let mut run = (sorted[0], 0_usize);
                for &v in &sorted {
                    if v == run.0 {
                        run.1 += 1;
                    } else {
                        run = (v, 1);
                    }
                    if run.1 > best.1 {
                        best = run;
                    }
                }
                Some(best.0)
            }
        }
    }
}

/// One participant's recorded vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Participant name.
    pub participant: String,
    /// The vote cast, or the fallback.
    pub value: f64,
    /// True if the participant failed and the fallback was used.
    pub fallback: bool,
    /// Why the fallback was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result of a voting round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteOutcome {
    /// Every vote, in participant order.
    pub votes: Vec<Vote>,
    /// Number of fallback votes.
    pub fallbacks: usize,
    /// Combined value.
    pub aggregate: f64,
}

impl VoteOutcome {
    /// Returns the votes that came from participants rather than the fallback.
    pub fn real_votes(&self) -> impl Iterator<Item = &Vote> {
        self.votes.iter().filter(|v| !v.fallback)
    }
}

/// Runs participants concurrently with per-participant failure isolation.
#[derive(Debug, Clone)]
pub struct VotingPool {
    participants: Vec<Arc<dyn Participant>>,
    timeout: Duration,
    fallback: f64,
    aggregation: Aggregation,
}

impl VotingPool {
    /// Creates a pool. Each participant gets `timeout` to answer.
    #[must_use]
    pub fn new(participants: Vec<Arc<dyn Participant>>, timeout: Duration) -> Self {
        Self {
            participants,
            timeout,
            fallback: 0.0,
            aggregation: Aggregation::default(),
        }
    }

    /// Sets the vote substituted for a failed participant.
    #[must_use]
    pub fn with_fallback(mut self, fallback: f64) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sets the aggregation.
    #[must_use]
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Returns the number of participants, which is also the worker count.
    #[must_use]
    pub fn size(&self) -> usize {
        self.participants.len()
    }

    /// Collects one vote from every participant and aggregates them.
    pub async fn collect(&self, input: &Payload) -> VoteOutcome {
        let handles: Vec<_> = self
            .participants
            .iter()
            .map(|participant| {
                let participant = Arc::clone(participant);
                let input = input.clone();
                let timeout = self.timeout;
                tokio::spawn(async move {
                    match tokio::time::timeout(timeout, participant.vote(&input)).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err(format!("timed out after {timeout:?}")),
                    }
                })
            })
            .collect();

        let results = join_all(handles).await;

        let votes: Vec<Vote> = self
            .participants
            .iter()
            .zip(results)
            .map(|(participant, joined)| {
                let outcome = joined.unwrap_or_else(|e| Err(format!("task failed: {e}")));
                match outcome {
                    Ok(value) => Vote {
                        participant: participant.name().to_string(),
                        value,
                        fallback: false,
                        reason: None,
                    },
                    Err(reason) => {
                        warn!(
                            participant = participant.name(),
                            reason = %reason,
                            "Participant failed, using fallback vote"
                        );
                        Vote {
                            participant: participant.name().to_string(),
                            value: self.fallback,
                            fallback: true,
                            reason: Some(reason),
                        }
                    }
                }
            })
            .collect();

        let values: Vec<f64> = votes.iter().map(|v| v.value).collect();
        let aggregate = self.aggregation.apply(&values).unwrap_or(self.fallback);
        let fallbacks = votes.iter().filter(|v| v.fallback).count();

        debug!(
            participants = votes.len(),
            fallbacks,
            aggregate,
            "Voting round complete"
        );

        VoteOutcome {
            votes,
            fallbacks,
            aggregate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct Fixed(&'static str, f64);

    #[async_trait]
    impl Participant for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn vote(&self, _input: &Payload) -> Result<f64, StageError> {
            Ok(self.1)
        }
    }

    #[derive(Debug)]
    struct Broken;

    #[async_trait]
    impl Participant for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn vote(&self, _input: &Payload) -> Result<f64, StageError> {
            Err(StageError::internal("estimator crashed"))
        }
    }

    #[derive(Debug)]
    struct Panics;

    #[async_trait]
    impl Participant for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        async fn vote(&self, _input: &Payload) -> Result<f64, StageError> {
            panic!("participant bug")
        }
    }

    #[derive(Debug)]
    struct Slow;

    #[async_trait]
    impl Participant for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn vote(&self, _input: &Payload) -> Result<f64, StageError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(100.0)
        }
    }

    #[tokio::test]
    async fn test_one_failure_uses_fallback() {
        let participants: Vec<Arc<dyn Participant>> = vec![
            Arc::new(Fixed("a", 3.0)),
            Arc::new(Fixed("b", 5.0)),
            Arc::new(Broken),
            Arc::new(Fixed("d", 5.0)),
            Arc::new(Fixed("e", 8.0)),
        ];
        let pool = VotingPool::new(participants, Duration::from_secs(5)).with_fallback(4.0);
        assert_eq!(pool.size(), 5);

        let outcome = pool.collect(&Payload::new()).await;

        assert_eq!(outcome.votes.len(), 5);
        assert_eq!(outcome.fallbacks, 1);
        assert_eq!(outcome.real_votes().count(), 4);
        assert!(outcome.votes[2].fallback);
        assert_eq!(outcome.votes[2].participant, "broken");
        assert!((outcome.votes[2].value - 4.0).abs() < f64::EPSILON);
        assert!((outcome.aggregate - 5.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let participants: Vec<Arc<dyn Participant>> =
            vec![Arc::new(Panics), Arc::new(Fixed("ok", 2.0))];
        let outcome = VotingPool::new(participants, Duration::from_secs(1))
            .collect(&Payload::new())
            .await;

        assert_eq!(outcome.fallbacks, 1);
        assert!(outcome.votes[0].fallback);
        assert!(!outcome.votes[1].fallback);
        assert!((outcome.aggregate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_uses_fallback() {
        let participants: Vec<Arc<dyn Participant>> =
            vec![Arc::new(Slow), Arc::new(Fixed("fast", 7.0))];
        let outcome = VotingPool::new(participants, Duration::from_secs(1))
            .with_fallback(7.0)
            .with_aggregation(Aggregation::Majority)
            .collect(&Payload::new())
            .await;

        assert!(outcome.votes[0].fallback);
        assert!(outcome.votes[0]
            .reason
            .as_deref()
            .is_some_and(|r| r.starts_with("timed out")));
        assert!((outcome.aggregate - 7.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_pool_aggregates_to_fallback() {
        let outcome = VotingPool::new(Vec::new(), Duration::from_secs(1))
            .with_fallback(1.5)
            .collect(&Payload::new())
            .await;
        assert!(outcome.votes.is_empty());
        assert!((outcome.aggregate - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aggregations() {
        let values = [1.0, 3.0, 3.0, 9.0];
        assert_eq!(Aggregation::Average.apply(&values), Some(4.0));
        assert_eq!(Aggregation::Median.apply(&values), Some(3.0));
        assert_eq!(Aggregation::Majority.apply(&values), Some(3.0));
        assert_eq!(Aggregation::Median.apply(&[2.0, 1.0, 5.0]), Some(2.0));
        assert_eq!(Aggregation::Majority.apply(&[2.0, 1.0]), Some(1.0));
        assert_eq!(Aggregation::Average.apply(&[]), None);
    }
}
