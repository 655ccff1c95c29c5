use crate::library::telemetry::MetricsSource;
use opentelemetry::KeyValue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing the work done by a service
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    received: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    published: AtomicU64,
}

/// Point in time copy of [`DispatchMetrics`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Entries read from any stream
    pub received: u64,
    /// Events handled without error
    pub processed: u64,
    /// Events the handler returned an error for
    pub failed: u64,
    /// Events rejected by field validation
    pub skipped: u64,
    /// Events written to outbound streams
    pub published: u64,
}

impl DispatchMetrics {
    pub(super) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSource for DispatchMetrics {
    fn snapshot(&self) -> Vec<KeyValue> {
        let snapshot = DispatchMetrics::snapshot(self);

        vec![
            KeyValue::new("events.received", snapshot.received as i64),
            KeyValue::new("events.processed", snapshot.processed as i64),
            KeyValue::new("events.failed", snapshot.failed as i64),
            KeyValue::new("events.skipped", snapshot.skipped as i64),
            KeyValue::new("events.published", snapshot.published as i64),
        ]
    }
}
