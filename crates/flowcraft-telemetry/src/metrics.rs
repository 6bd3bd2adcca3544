//! In-memory metric primitives and a registry keyed by name.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// A monotonically increasing counter.
#[derive(Debug, Clone)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    /// Construct a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self { value: Arc::new(AtomicU64::new(0)) }
    }

    /// Increment by one.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by `n`.
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// A gauge that can move up and down.
#[derive(Debug, Clone)]
pub struct Gauge {
    value: Arc<AtomicI64>,
}

impl Gauge {
    /// Construct a gauge starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self { value: Arc::new(AtomicI64::new(0)) }
    }

    /// Increment by one.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement by one.
    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    /// Set to an exact value.
    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

/// Records observations; suitable for development and test assertions,
/// not for production-scale cardinality.
#[derive(Debug, Clone)]
pub struct Histogram {
    observations: Arc<RwLock<Vec<f64>>>,
}

impl Histogram {
    /// Construct an empty histogram.
    #[must_use]
    pub fn new() -> Self {
        Self { observations: Arc::new(RwLock::new(Vec::new())) }
    }

    /// Record one observation.
    pub fn observe(&self, value: f64) {
        self.observations.write().expect("histogram lock poisoned").push(value);
    }

    /// Number of observations recorded.
    #[must_use]
    pub fn count(&self) -> usize {
        self.observations.read().expect("histogram lock poisoned").len()
    }

    /// Sum of all observations.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.observations.read().expect("histogram lock poisoned").iter().sum()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// A name-keyed registry of counters, gauges, and histograms.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    counters: Arc<RwLock<HashMap<String, Counter>>>,
    gauges: Arc<RwLock<HashMap<String, Gauge>>>,
    histograms: Arc<RwLock<HashMap<String, Histogram>>>,
}

impl MetricsRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: Arc::new(RwLock::new(HashMap::new())),
            gauges: Arc::new(RwLock::new(HashMap::new())),
            histograms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get or create a counter by name.
    pub fn counter(&self, name: &str) -> Counter {
        self.counters.write().expect("counter lock poisoned").entry(name.to_owned()).or_default().clone()
    }

    /// Get or create a gauge by name.
    pub fn gauge(&self, name: &str) -> Gauge {
        self.gauges.write().expect("gauge lock poisoned").entry(name.to_owned()).or_default().clone()
    }

    /// Get or create a histogram by name.
    pub fn histogram(&self, name: &str) -> Histogram {
        self.histograms.write().expect("histogram lock poisoned").entry(name.to_owned()).or_default().clone()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_increments() {
        let c = Counter::new();
        c.inc();
        c.inc_by(4);
        assert_eq!(c.get(), 5);
    }

    #[test]
    fn gauge_moves_up_and_down() {
        let g = Gauge::new();
        g.inc();
        g.inc();
        g.dec();
        assert_eq!(g.get(), 1);
        g.set(10);
        assert_eq!(g.get(), 10);
    }

    #[test]
    fn histogram_records_and_sums() {
        let h = Histogram::new();
        h.observe(1.0);
        h.observe(2.0);
        assert_eq!(h.count(), 2);
        assert!((h.sum() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn registry_returns_the_same_metric_for_the_same_name() {
        let reg = MetricsRegistry::new();
        reg.counter("x").inc();
        assert_eq!(reg.counter("x").get(), 1);
    }

    #[test]
    fn registry_names_are_independent() {
        let reg = MetricsRegistry::new();
        reg.counter("a").inc();
        assert_eq!(reg.counter("b").get(), 0);
    }
}
