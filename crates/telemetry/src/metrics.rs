//! Internal metrics collection.
//!
//! Collects worker metrics in-memory; the worker scheduler periodically
//! flushes a snapshot to ClickHouse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements, saturating at zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 50ms, 100ms, 500ms, 1s, 5s, 30s, 60s, 5m
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    // File processing runs far longer than a single request, so the upper
    // buckets reach into minutes.
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 50, 100, 500, 1_000, 5_000, 30_000, 60_000, 300_000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns (upper bound, count) pairs.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the ingestion worker.
#[derive(Debug, Default)]
pub struct Metrics {
    // Consumer metrics
    pub events_consumed: Counter,
    pub events_invalid: Counter,
    pub events_redelivered: Counter,
    pub events_dead_lettered: Counter,
    pub offsets_committed: Counter,

    // Parser metrics
    pub rows_parsed: Counter,
    pub rows_skipped: Counter,

    // Persistence metrics
    pub batches_inserted: Counter,
    pub batch_insert_errors: Counter,
    pub batches_aborted: Counter,
    pub rows_inserted: Counter,

    // File outcomes
    pub files_completed: Counter,
    pub files_failed: Counter,
    pub files_skipped: Counter,

    // Latency histograms
    pub batch_insert_latency_ms: Histogram,
    pub file_processing_latency_ms: Histogram,

    // Gauges
    pub batches_in_flight: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub events_consumed: u64,
    pub events_invalid: u64,
    pub events_redelivered: u64,
    pub events_dead_lettered: u64,
    pub offsets_committed: u64,
    pub rows_parsed: u64,
    pub rows_skipped: u64,
    pub batches_inserted: u64,
    pub batch_insert_errors: u64,
    pub batches_aborted: u64,
    pub rows_inserted: u64,
    pub files_completed: u64,
    pub files_failed: u64,
    pub files_skipped: u64,
    pub batch_insert_latency_mean_ms: f64,
    pub file_processing_latency_mean_ms: f64,
    pub batches_in_flight: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_consumed: self.events_consumed.get(),
            events_invalid: self.events_invalid.get(),
            events_redelivered: self.events_redelivered.get(),
            events_dead_lettered: self.events_dead_lettered.get(),
            offsets_committed: self.offsets_committed.get(),
            rows_parsed: self.rows_parsed.get(),
            rows_skipped: self.rows_skipped.get(),
            batches_inserted: self.batches_inserted.get(),
            batch_insert_errors: self.batch_insert_errors.get(),
            batches_aborted: self.batches_aborted.get(),
            rows_inserted: self.rows_inserted.get(),
            files_completed: self.files_completed.get(),
            files_failed: self.files_failed.get(),
            files_skipped: self.files_skipped.get(),
            batch_insert_latency_mean_ms: self.batch_insert_latency_ms.mean(),
            file_processing_latency_mean_ms: self.file_processing_latency_ms.mean(),
            batches_in_flight: self.batches_in_flight.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
