//! Built-in observers.

use super::{EventType, Observer, ObserverResult, PipelineEvent};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};

/// Observer that renders events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    level: Level,
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingObserver {
    /// Creates a logging observer at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging observer.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

#[async_trait]
impl Observer for LoggingObserver {
    fn name(&self) -> &str {
        "logging"
    }

    async fn on_event(&self, event: &PipelineEvent) -> ObserverResult {
        let data = serde_json::Value::Object(event.data.clone());
        match self.level {
            Level::DEBUG | Level::TRACE => debug!(
                event_type = %event.event_type,
                run_id = %event.run_id,
                stage = %event.stage_name,
                data = %data,
                "Pipeline event"
            ),
            Level::WARN | Level::ERROR => warn!(
                event_type = %event.event_type,
                run_id = %event.run_id,
                stage = %event.stage_name,
                data = %data,
                "Pipeline event"
            ),
            _ => info!(
                event_type = %event.event_type,
                run_id = %event.run_id,
                stage = %event.stage_name,
                data = %data,
                "Pipeline event"
            ),
        }
        Ok(())
    }
}

/// Observer that keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingObserver {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns events of one type.
    #[must_use]
    pub fn events_of_type(&self, event_type: EventType) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Returns the sequence of event types received.
    #[must_use]
    pub fn event_types(&self) -> Vec<EventType> {
        self.events.read().iter().map(|e| e.event_type).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl Observer for CollectingObserver {
    fn name(&self) -> &str {
        "collecting"
    }

    async fn on_event(&self, event: &PipelineEvent) -> ObserverResult {
        self.events.write().push(event.clone());
        Ok(())
    }
}

/// Observer that counts events per type and stage.
#[derive(Debug, Default)]
pub struct MetricsObserver {
    counts: DashMap<(EventType, String), u64>,
}

impl MetricsObserver {
    /// Creates an observer with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many events of a type a stage produced.
    #[must_use]
    pub fn count(&self, event_type: EventType, stage_name: &str) -> u64 {
        self.counts
            .get(&(event_type, stage_name.to_string()))
            .map_or(0, |c| *c)
    }

    /// Returns how many events of a type were seen across stages.
    #[must_use]
    pub fn total(&self, event_type: EventType) -> u64 {
        self.counts
            .iter()
            .filter(|entry| entry.key().0 == event_type)
            .map(|entry| *entry.value())
            .sum()
    }

    /// Returns the counters as JSON, keyed `"<TYPE>/<stage>"`.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .counts
            .iter()
            .map(|entry| {
                let (event_type, stage) = entry.key();
                (format!("{event_type}/{stage}"), serde_json::json!(*entry.value()))
            })
            .collect();
        serde_json::Value::Object(map)
    }

    /// Resets all counters.
    pub fn reset(&self) {
        self.counts.clear();
    }
}

#[async_trait]
impl Observer for MetricsObserver {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn on_event(&self, event: &PipelineEvent) -> ObserverResult {
        *self
            .counts
            .entry((event.event_type, event.stage_name.clone()))
            .or_insert(0) += 1;
        Ok(())
    }
}
