//! Server metrics: request counters and latency statistics.
//!
//! # Responsibilities
//! - Count total requests and in-flight requests
//! - Keep a bounded rolling history of request durations
//! - Compute nearest-rank percentiles and min/avg/max latency
//! - Produce a JSON-serializable snapshot for the `/metrics` route
//!
//! # Design Decisions
//! - Explicitly constructed and injected (`Arc<Metrics>` owned by the entry
//!   point, handed to every engine and session) rather than a global
//! - Counters are atomics; the duration history sits behind a mutex and is
//!   capped at [`MAX_DURATION_SAMPLES`], evicting oldest-first
//! - Safe under concurrent start/end calls from any number of handler threads

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;

/// Rolling history cap for percentile computation.
pub const MAX_DURATION_SAMPLES: usize = 10_000;

/// Errors from metrics queries.
#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    /// Percentile argument outside `[0, 100]`.
    #[error("percentile must be between 0 and 100, got {0}")]
    InvalidPercentile(f64),
}

/// Thread-safe request metrics shared by all concurrently executing
/// connection handlers.
#[derive(Debug, Default)]
pub struct Metrics {
    total_requests: AtomicU64,
    active_connections: AtomicI64,
    durations: Mutex<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a request.
    pub fn on_request_start(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the completion of a request with its duration.
    pub fn on_request_end(&self, duration_ms: u64) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);

        let mut durations = self.durations.lock().unwrap_or_else(|e| e.into_inner());
        if durations.len() >= MAX_DURATION_SAMPLES {
            durations.pop_front();
        }
        durations.push_back(duration_ms);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn active_connections(&self) -> i64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Nearest-rank percentile over the recorded durations:
    /// `index = ceil(p/100 * n) - 1`, clamped to >= 0. Empty history yields
    /// `0.0`.
    pub fn percentile(&self, p: f64) -> Result<f64, MetricsError> {
        if !(0.0..=100.0).contains(&p) {
            return Err(MetricsError::InvalidPercentile(p));
        }

        let durations = self.durations.lock().unwrap_or_else(|e| e.into_inner());
        if durations.is_empty() {
            return Ok(0.0);
        }

        let mut sorted: Vec<u64> = durations.iter().copied().collect();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as isize - 1;
        let index = index.max(0) as usize;
        Ok(sorted[index] as f64)
    }

    pub fn min_latency(&self) -> f64 {
        let durations = self.durations.lock().unwrap_or_else(|e| e.into_inner());
        durations.iter().min().copied().map_or(0.0, |v| v as f64)
    }

    pub fn max_latency(&self) -> f64 {
        let durations = self.durations.lock().unwrap_or_else(|e| e.into_inner());
        durations.iter().max().copied().map_or(0.0, |v| v as f64)
    }

    pub fn avg_latency(&self) -> f64 {
        let durations = self.durations.lock().unwrap_or_else(|e| e.into_inner());
        if durations.is_empty() {
            return 0.0;
        }
        let sum: u64 = durations.iter().sum();
        sum as f64 / durations.len() as f64
    }

    /// Reset all counters and the duration history.
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.active_connections.store(0, Ordering::Relaxed);
        self.durations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Consistent snapshot for the JSON metrics endpoint. Latency fields are
    /// rounded to two decimal places.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests(),
            active_connections: self.active_connections(),
            latency: LatencySummary {
                min: round2(self.min_latency()),
                max: round2(self.max_latency()),
                avg: round2(self.avg_latency()),
                // In-range constants; the error arm is unreachable.
                p50: round2(self.percentile(50.0).unwrap_or(0.0)),
                p95: round2(self.percentile(95.0).unwrap_or(0.0)),
                p99: round2(self.percentile(99.0).unwrap_or(0.0)),
            },
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Point-in-time view of the metrics, shaped for the `/metrics` route.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub active_connections: i64,
    pub latency: LatencySummary,
}

/// Latency statistics in milliseconds, rounded to two decimals.
#[derive(Debug, Clone, Serialize)]
pub struct LatencySummary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counts_requests_and_active_connections() {
        let metrics = Metrics::new();
        assert_eq!(metrics.total_requests(), 0);
        assert_eq!(metrics.active_connections(), 0);

        metrics.on_request_start();
        metrics.on_request_start();
        assert_eq!(metrics.total_requests(), 2);
        assert_eq!(metrics.active_connections(), 2);

        metrics.on_request_end(10);
        assert_eq!(metrics.total_requests(), 2);
        assert_eq!(metrics.active_connections(), 1);
    }

    #[test]
    fn percentiles_over_1_to_100() {
        let metrics = Metrics::new();
        for d in 1..=100 {
            metrics.on_request_start();
            metrics.on_request_end(d);
        }

        assert!((metrics.percentile(50.0).unwrap() - 50.0).abs() <= 1.0);
        assert!((metrics.percentile(95.0).unwrap() - 95.0).abs() <= 1.0);
        assert!((metrics.percentile(99.0).unwrap() - 99.0).abs() <= 1.0);
        assert_eq!(metrics.percentile(100.0).unwrap(), 100.0);
        assert_eq!(metrics.percentile(0.0).unwrap(), 1.0);
    }

    #[test]
    fn empty_history_yields_zero_everywhere() {
        let metrics = Metrics::new();
        assert_eq!(metrics.percentile(50.0).unwrap(), 0.0);
        assert_eq!(metrics.min_latency(), 0.0);
        assert_eq!(metrics.max_latency(), 0.0);
        assert_eq!(metrics.avg_latency(), 0.0);
    }

    #[test]
    fn out_of_range_percentile_fails() {
        let metrics = Metrics::new();
        assert_eq!(
            metrics.percentile(-1.0),
            Err(MetricsError::InvalidPercentile(-1.0))
        );
        assert_eq!(
            metrics.percentile(101.0),
            Err(MetricsError::InvalidPercentile(101.0))
        );
    }

    #[test]
    fn min_avg_max_latency() {
        let metrics = Metrics::new();
        for d in [10, 20, 30] {
            metrics.on_request_start();
            metrics.on_request_end(d);
        }
        assert_eq!(metrics.min_latency(), 10.0);
        assert_eq!(metrics.max_latency(), 30.0);
        assert_eq!(metrics.avg_latency(), 20.0);
    }

    #[test]
    fn history_evicts_oldest_at_cap() {
        let metrics = Metrics::new();
        for _ in 0..MAX_DURATION_SAMPLES {
            metrics.on_request_end(1);
        }
        // One more pushes out a 1 and leaves the max sample count intact.
        metrics.on_request_end(1000);
        assert_eq!(metrics.max_latency(), 1000.0);
        assert_eq!(metrics.percentile(100.0).unwrap(), 1000.0);

        let durations = metrics.durations.lock().unwrap();
        assert_eq!(durations.len(), MAX_DURATION_SAMPLES);
    }

    #[test]
    fn reset_clears_everything() {
        let metrics = Metrics::new();
        metrics.on_request_start();
        metrics.on_request_end(42);
        metrics.reset();

        assert_eq!(metrics.total_requests(), 0);
        assert_eq!(metrics.active_connections(), 0);
        assert_eq!(metrics.max_latency(), 0.0);
    }

    #[test]
    fn concurrent_recording_is_consistent() {
        let metrics = Arc::new(Metrics::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let m = Arc::clone(&metrics);
            handles.push(std::thread::spawn(move || {
                for _ in 0..500 {
                    m.on_request_start();
                    m.on_request_end(5);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.total_requests(), 4000);
        assert_eq!(metrics.active_connections(), 0);
        assert_eq!(metrics.max_latency(), 5.0);
    }

    #[test]
    fn snapshot_rounds_to_two_decimals() {
        let metrics = Metrics::new();
        for d in [1, 2] {
            metrics.on_request_start();
            metrics.on_request_end(d);
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.latency.avg, 1.5);
        assert_eq!(snap.total_requests, 2);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["totalRequests"], 2);
        assert!(json["latency"]["p50"].is_number());
    }
}
