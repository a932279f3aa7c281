//! Gateway metrics: request counters and a rolling latency window.
//!
//! Counters are lock-free atomics. The latency window is a fixed-capacity
//! ring buffer behind a mutex; appends overwrite the oldest sample. Derived
//! rates are computed on read.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Fixed-capacity ring buffer of latency samples (ms)
#[derive(Debug)]
struct LatencyWindow {
    samples: Vec<u64>,
    capacity: usize,
    next: usize,
}

impl LatencyWindow {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    fn push(&mut self, sample: u64) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.next] = sample;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<u64>() as f64 / self.samples.len() as f64
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.next = 0;
    }
}

/// Read-only metrics view for dashboards
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Mean of the rolling latency window (ms)
    pub avg_response_time: f64,
    /// Failed over total, in `[0, 1]`
    pub error_rate: f64,
    /// Cache hits over cacheable lookups, in `[0, 1]`
    pub cache_hit_rate: f64,
    pub rate_limit_violations: u64,
}

/// API Gateway metrics
pub struct GatewayMetrics {
    // Request counters
    pub requests_total: AtomicU64,
    pub requests_success: AtomicU64,
    pub requests_error: AtomicU64,

    // Policy counters
    pub rate_limit_violations: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,

    latencies: Mutex<LatencyWindow>,
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl GatewayMetrics {
    /// Keep the last `latency_window` latency samples
    pub fn new(latency_window: usize) -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            requests_success: AtomicU64::new(0),
            requests_error: AtomicU64::new(0),
            rate_limit_violations: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            latencies: Mutex::new(LatencyWindow::new(latency_window)),
        }
    }

    /// Record a completed request
    pub fn record_request(&self, success: bool, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        if success {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_error.fetch_add(1, Ordering::Relaxed);
        }

        self.latencies.lock().push(latency_ms);
    }

    pub fn record_rate_limit_violation(&self) {
        self.rate_limit_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Mean latency over the rolling window (ms)
    pub fn average_latency_ms(&self) -> f64 {
        self.latencies.lock().average()
    }

    /// Number of latency samples currently held
    pub fn latency_samples(&self) -> usize {
        self.latencies.lock().len()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.requests_total.load(Ordering::Relaxed);
        let success = self.requests_success.load(Ordering::Relaxed);
        let failed = self.requests_error.load(Ordering::Relaxed);
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_requests: total,
            successful_requests: success,
            failed_requests: failed,
            avg_response_time: self.average_latency_ms(),
            error_rate: ratio(failed, total),
            cache_hit_rate: ratio(hits, hits + misses),
            rate_limit_violations: self.rate_limit_violations.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter and drop latency samples
    pub fn reset(&self) {
        self.requests_total.store(0, Ordering::Relaxed);
        self.requests_success.store(0, Ordering::Relaxed);
        self.requests_error.store(0, Ordering::Relaxed);
        self.rate_limit_violations.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.latencies.lock().clear();
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut output = String::new();

        output.push_str(&format!(
            "# HELP gateway_requests_total Total number of gateway requests\n\
             # TYPE gateway_requests_total counter\n\
             gateway_requests_total {}\n",
            s.total_requests
        ));

        output.push_str(&format!(
            "# HELP gateway_requests_success_total Successful requests\n\
             # TYPE gateway_requests_success_total counter\n\
             gateway_requests_success_total {}\n",
            s.successful_requests
        ));

        output.push_str(&format!(
            "# HELP gateway_requests_error_total Failed requests\n\
             # TYPE gateway_requests_error_total counter\n\
             gateway_requests_error_total {}\n",
            s.failed_requests
        ));

        output.push_str(&format!(
            "# HELP gateway_rate_limit_violations_total Rate limited requests\n\
             # TYPE gateway_rate_limit_violations_total counter\n\
             gateway_rate_limit_violations_total {}\n",
            s.rate_limit_violations
        ));

        output.push_str(&format!(
            "# HELP gateway_cache_hit_rate Cache hits over cacheable lookups\n\
             # TYPE gateway_cache_hit_rate gauge\n\
             gateway_cache_hit_rate {:.4}\n",
            s.cache_hit_rate
        ));

        output.push_str(&format!(
            "# HELP gateway_average_latency_ms Rolling average request latency\n\
             # TYPE gateway_average_latency_ms gauge\n\
             gateway_average_latency_ms {:.2}\n",
            s.avg_response_time
        ));

        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_default()
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64).clamp(0.0, 1.0)
    }
}

/// Measures one request from creation to `finish`
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn finish(self, metrics: &GatewayMetrics, success: bool) -> u64 {
        let latency_ms = self.elapsed_ms();
        metrics.record_request(success, latency_ms);
        latency_ms
    }
}
