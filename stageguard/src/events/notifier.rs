//! Observer trait and the notifier that shields the engine from it.

use super::PipelineEvent;
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, warn};

/// Result returned by an observer.
pub type ObserverResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Passive subscriber to lifecycle events.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Name used in logs when the observer misbehaves.
    fn name(&self) -> &str {
        "observer"
    }

    /// Handles one event.
    async fn on_event(&self, event: &PipelineEvent) -> ObserverResult;
}

/// Fire-and-forget fan-out to registered observers.
///
/// Observers are called in subscription order. Errors and panics are
/// logged and never reach the caller.
#[derive(Default)]
pub struct EventNotifier {
    observers: RwLock<Vec<Arc<dyn Observer>>>,
}

impl EventNotifier {
    /// Creates a notifier with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer.
    pub fn subscribe(&self, observer: Arc<dyn Observer>) {
        self.observers.write().push(observer);
    }

    /// Adds an observer, builder style.
    #[must_use]
    pub fn with_observer(self, observer: Arc<dyn Observer>) -> Self {
        self.subscribe(observer);
        self
    }

    /// Returns the number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Returns true if nobody is listening.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Delivers an event to every observer.
    pub async fn notify(&self, event: PipelineEvent) {
        let observers = self.observers.read().clone();
        for observer in observers {
            match AssertUnwindSafe(observer.on_event(&event)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        observer = observer.name(),
                        event_type = %event.event_type,
                        run_id = %event.run_id,
                        stage = %event.stage_name,
                        error = %e,
                        "Observer failed"
                    );
                }
                Err(panic) => {
                    error!(
                        observer = observer.name(),
                        event_type = %event.event_type,
                        run_id = %event.run_id,
                        stage = %event.stage_name,
                        panic = panic_message(panic.as_ref()),
                        "Observer panicked"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventNotifier")
            .field("observers", &self.len())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
