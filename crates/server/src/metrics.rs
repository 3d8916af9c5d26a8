//! Runtime counters backing `GET /health/stats` (SPEC_FULL §14: request
//! count, error count, uptime — scoped down from the teacher's
//! `metrics::MetricsLayer` now that OTEL export is out of core).

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

/// Process-wide request/error counters, updated by [`crate::logging`].
pub struct Metrics {
    requests: AtomicU64,
    errors: AtomicU64,
    started_at: Instant,
}

impl Metrics {
    /// Start a fresh counter set, clocked from construction time.
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record one completed request, noting whether it ended in a 4xx/5xx.
    pub fn record(&self, is_error: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A point-in-time snapshot for the stats endpoint.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot returned by `GET /health/stats`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Total requests observed since process start.
    pub requests: u64,
    /// Requests that completed with a 4xx/5xx status.
    pub errors: u64,
    /// Seconds since process start.
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_only_errors_as_errors() {
        let metrics = Metrics::new();
        metrics.record(false);
        metrics.record(true);
        metrics.record(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests, 3);
        assert_eq!(snapshot.errors, 1);
    }
}
