//! Lifecycle event fan-out.
//!
//! The recovery engine reports what it is doing through an
//! [`EventNotifier`]; observers subscribe passively and can never
//! influence or break orchestration. A failing or panicking observer is
//! logged and skipped.

mod event;
mod notifier;
mod observers;

pub use event::{EventType, PipelineEvent};
pub use notifier::{EventNotifier, Observer, ObserverResult};
pub use observers::{CollectingObserver, LoggingObserver, MetricsObserver};
