//! Event bus and in-memory metrics for the Flowcraft workflow engine.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod event;
pub mod metrics;
pub mod service;

pub use event::{EventBus, EventSubscriber, ExecutionEvent};
pub use metrics::{Counter, Gauge, Histogram, MetricsRegistry};
pub use service::{DefaultTelemetry, TelemetryService};

/// Re-exports of the most commonly used types.
pub mod prelude {
    pub use crate::{DefaultTelemetry, EventBus, ExecutionEvent, MetricsRegistry, TelemetryService};
}
