//! Counters reported by the fetch and write stages.
//!
//! The pipeline never touches process-wide state: every component receives an
//! `Arc<dyn MetricsSink>` and reports through it.

use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};

pub trait MetricsSink: Send + Sync + Debug {
    fn fetch_succeeded(&self);
    fn fetch_failed(&self, reason: &'static str);
    /// Time from request dispatch until the response headers arrived.
    fn observe_response(&self, status: u16, seconds: f64);
    fn write_succeeded(&self);
    fn write_failed(&self, reason: &'static str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn fetch_succeeded(&self) {}
    fn fetch_failed(&self, _reason: &'static str) {}
    fn observe_response(&self, _status: u16, _seconds: f64) {}
    fn write_succeeded(&self) {}
    fn write_failed(&self, _reason: &'static str) {}
}

/// Keeps plain counts in memory. Handy in tests and for a final summary line.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    fetch_successes: AtomicU64,
    write_successes: AtomicU64,
    fetch_failures: Mutex<HashMap<&'static str, u64>>,
    write_failures: Mutex<HashMap<&'static str, u64>>,
    responses: Mutex<Vec<u16>>,
}

impl RecordingMetrics {
    pub fn fetch_successes(&self) -> u64 {
        self.fetch_successes.load(Ordering::Relaxed)
    }

    pub fn write_successes(&self) -> u64 {
        self.write_successes.load(Ordering::Relaxed)
    }

    pub fn fetch_failures(&self, reason: &str) -> u64 {
        count(&self.fetch_failures, reason)
    }

    pub fn write_failures(&self, reason: &str) -> u64 {
        count(&self.write_failures, reason)
    }

    /// Status codes observed so far, in order.
    pub fn responses(&self) -> Vec<u16> {
        self.responses.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

fn count(map: &Mutex<HashMap<&'static str, u64>>, reason: &str) -> u64 {
    map.lock().ok().and_then(|m| m.get(reason).copied()).unwrap_or(0)
}

fn bump(map: &Mutex<HashMap<&'static str, u64>>, reason: &'static str) {
    if let Ok(mut m) = map.lock() {
        *m.entry(reason).or_default() += 1;
    }
}

impl MetricsSink for RecordingMetrics {
    fn fetch_succeeded(&self) {
        self.fetch_successes.fetch_add(1, Ordering::Relaxed);
    }

    fn fetch_failed(&self, reason: &'static str) {
        bump(&self.fetch_failures, reason);
    }

    fn observe_response(&self, status: u16, _seconds: f64) {
        if let Ok(mut r) = self.responses.lock() {
            r.push(status);
        }
    }

    fn write_succeeded(&self) {
        self.write_successes.fetch_add(1, Ordering::Relaxed);
    }

    fn write_failed(&self, reason: &'static str) {
        bump(&self.write_failures, reason);
    }
}

/// Standard Prometheus client bucket boundaries, in seconds.
pub const DEFAULT_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReasonLabels {
    reason: &'static str,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct StatusLabels {
    status_code: String,
}

/// Prometheus-backed sink. Register it once, then share it with the exporter.
#[derive(Debug)]
pub struct PrometheusMetrics {
    successes: Counter,
    errors: Family<ReasonLabels, Counter>,
    response_times: Family<StatusLabels, Histogram>,
    writes: Counter,
    write_errors: Family<ReasonLabels, Counter>,
}

impl PrometheusMetrics {
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self {
            successes: Counter::default(),
            errors: Family::default(),
            response_times: Family::new_with_constructor(|| Histogram::new(DEFAULT_BUCKETS.into_iter())),
            writes: Counter::default(),
            write_errors: Family::default(),
        };

        let metie = registry.sub_registry_with_prefix("metie");
        metie.register("successes", "The total number of successful requests", metrics.successes.clone());
        metie.register("errors", "The total number of failed requests", metrics.errors.clone());
        metie.register(
            "response_time_seconds",
            "The response time of the server",
            metrics.response_times.clone(),
        );
        metie.register("writes", "The total number of rows written", metrics.writes.clone());
        metie.register("write_errors", "The total number of failed writes", metrics.write_errors.clone());

        metrics
    }
}

impl MetricsSink for PrometheusMetrics {
    fn fetch_succeeded(&self) {
        self.successes.inc();
    }

    fn fetch_failed(&self, reason: &'static str) {
        self.errors.get_or_create(&ReasonLabels { reason }).inc();
    }

    fn observe_response(&self, status: u16, seconds: f64) {
        self.response_times
            .get_or_create(&StatusLabels { status_code: status.to_string() })
            .observe(seconds);
    }

    fn write_succeeded(&self) {
        self.writes.inc();
    }

    fn write_failed(&self, reason: &'static str) {
        self.write_errors.get_or_create(&ReasonLabels { reason }).inc();
    }
}
