use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding-window tracker for per-item processing latency
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: Arc<Mutex<VecDeque<u64>>>,
    window: usize,
}

impl LatencyWindow {
    /// Create a tracker keeping the most recent `window` samples
    pub fn new(window: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(window))),
            window,
        }
    }

    /// Record one measurement
    pub fn record(&self, elapsed: Duration) {
        let mut samples = self.samples.lock();
        if samples.len() >= self.window {
            samples.pop_front();
        }
        samples.push_back(elapsed.as_nanos() as u64);
    }

    /// Latency quantile over the current window, in microseconds.
    /// `q` is in `[0.0, 1.0]`; returns 0.0 with no samples.
    pub fn quantile_us(&self, q: f64) -> f64 {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<_> = samples.iter().copied().collect();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64 * q).ceil() as usize).saturating_sub(1);
        sorted[idx] as f64 / 1000.0
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    /// Whether no samples have been recorded yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-stage counters, shared between a running stage and observers
#[derive(Debug, Clone)]
pub struct StageMetrics {
    items: Arc<AtomicU64>,
    latency: LatencyWindow,
    started: Instant,
}

impl StageMetrics {
    pub fn new() -> Self {
        Self {
            items: Arc::new(AtomicU64::new(0)),
            latency: LatencyWindow::new(1024),
            started: Instant::now(),
        }
    }

    /// Record one processed item and how long its handling took
    pub fn record_item(&self, elapsed: Duration) {
        self.items.fetch_add(1, Ordering::Relaxed);
        self.latency.record(elapsed);
    }

    /// Total items processed so far
    pub fn items(&self) -> u64 {
        self.items.load(Ordering::Relaxed)
    }

    /// Items per second since the stage was created
    pub fn throughput(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.items() as f64 / elapsed
        }
    }

    /// Capture the current counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items: self.items(),
            throughput: self.throughput(),
            latency_p50_us: self.latency.quantile_us(0.50),
            latency_p95_us: self.latency.quantile_us(0.95),
            latency_p99_us: self.latency.quantile_us(0.99),
            elapsed: self.started.elapsed(),
        }
    }
}

impl Default for StageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time copy of one stage's metrics
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub items: u64,
    pub throughput: f64,
    pub latency_p50_us: f64,
    pub latency_p95_us: f64,
    pub latency_p99_us: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format as a single human-readable line
    pub fn format(&self) -> String {
        format!(
            "items: {}, throughput: {:.2}/s, latency p50: {:.2}µs, p95: {:.2}µs, \
             p99: {:.2}µs, elapsed: {:.2}s",
            self.items,
            self.throughput,
            self.latency_p50_us,
            self.latency_p95_us,
            self.latency_p99_us,
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_window_quantiles() {
        let window = LatencyWindow::new(10);
        for i in 1..=10 {
            window.record(Duration::from_micros(i));
        }
        assert!(window.quantile_us(0.5) > 0.0);
        assert!(window.quantile_us(0.99) >= window.quantile_us(0.5));
    }

    #[test]
    fn test_latency_window_evicts_oldest() {
        let window = LatencyWindow::new(4);
        for i in 1..=8 {
            window.record(Duration::from_micros(i));
        }
        assert_eq!(window.len(), 4);
        // only the last four samples (5..=8µs) remain
        assert!(window.quantile_us(0.0) >= 5.0);
    }

    #[test]
    fn test_stage_metrics_counts() {
        let metrics = StageMetrics::new();
        for _ in 0..100 {
            metrics.record_item(Duration::from_micros(3));
        }
        assert_eq!(metrics.items(), 100);
        assert!(metrics.throughput() > 0.0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.items, 100);
        assert!(snapshot.format().contains("items: 100"));
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = StageMetrics::new();
        let observer = metrics.clone();
        metrics.record_item(Duration::from_micros(1));
        assert_eq!(observer.items(), 1);
    }
}
