//! The telemetry facade shared across the executor, orchestrator, and
//! distributed adapter.

use std::sync::Arc;

use crate::event::EventBus;
use crate::metrics::MetricsRegistry;

/// Access to the event bus and metrics registry, shared via
/// `Arc<dyn TelemetryService>`.
pub trait TelemetryService: Send + Sync {
    /// The event bus for this run/process.
    fn event_bus(&self) -> &EventBus;
    /// The metrics registry for this run/process.
    fn metrics(&self) -> &MetricsRegistry;
}

/// A self-contained telemetry service with its own bus and registry.
///
/// Suitable as the default for both in-process runs and single-process
/// test exercises of the distributed adapter.
pub struct DefaultTelemetry {
    event_bus: EventBus,
    metrics: MetricsRegistry,
}

impl DefaultTelemetry {
    /// Construct a new telemetry service with the given event bus capacity.
    #[must_use]
    pub fn new(event_bus_capacity: usize) -> Self {
        Self { event_bus: EventBus::new(event_bus_capacity), metrics: MetricsRegistry::new() }
    }

    /// Construct as a shareable `Arc<dyn TelemetryService>`.
    #[must_use]
    pub fn arc(event_bus_capacity: usize) -> Arc<dyn TelemetryService> {
        Arc::new(Self::new(event_bus_capacity))
    }
}

impl Default for DefaultTelemetry {
    fn default() -> Self {
        Self::new(128)
    }
}

impl TelemetryService for DefaultTelemetry {
    fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ExecutionEvent;

    #[test]
    fn default_telemetry_does_not_panic_on_use() {
        let telemetry = DefaultTelemetry::default();
        telemetry.event_bus().emit(ExecutionEvent::WorkflowStart {
            execution_id: "e1".into(),
            blueprint_id: "b1".into(),
        });
        telemetry.metrics().counter("x").inc();
    }

    #[test]
    fn arc_is_object_safe() {
        let t: Arc<dyn TelemetryService> = DefaultTelemetry::arc(16);
        t.metrics().gauge("g").set(3);
        assert_eq!(t.metrics().gauge("g").get(), 3);
    }
}
