//! Query latency tracking.
//!
//! A bounded ring buffer of the most recent query durations with
//! nearest-rank percentiles. Recording is O(1); reading sorts a copy.

use serde::Serialize;
use std::collections::VecDeque;

/// Maximum retained samples.
pub const LATENCY_CAPACITY: usize = 100;

/// Summary statistics over the retained window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    /// Median duration (ms)
    pub p50: u64,
    /// 95th percentile duration (ms)
    pub p95: u64,
    /// 99th percentile duration (ms)
    pub p99: u64,
    /// Mean duration (ms)
    pub mean: f64,
    /// Number of samples in the window
    pub count: usize,
}

/// Ring buffer of recent query durations in milliseconds.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    samples: VecDeque<u64>,
}

impl LatencyTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(LATENCY_CAPACITY),
        }
    }

    /// Records one query duration, evicting the oldest sample when full.
    pub fn record(&mut self, duration_ms: u64) {
        if self.samples.len() == LATENCY_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(duration_ms);
    }

    /// Number of retained samples.
    pub fn count(&self) -> usize {
        self.samples.len()
    }

    /// Nearest-rank percentile: `index = ceil(p/100 * n) - 1` on a sorted
    /// copy. Returns 0 for an empty window.
    pub fn percentile(&self, p: u8) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let n = sorted.len();
        let rank = (f64::from(p) / 100.0 * n as f64).ceil() as usize;
        sorted[rank.clamp(1, n) - 1]
    }

    /// Mean of the retained samples, 0.0 when empty.
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<u64>() as f64 / self.samples.len() as f64
    }

    /// Full summary snapshot.
    pub fn summary(&self) -> LatencySummary {
        LatencySummary {
            p50: self.percentile(50),
            p95: self.percentile(95),
            p99: self.percentile(99),
            mean: self.mean(),
            count: self.count(),
        }
    }

    /// Drops all samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary() {
        let tracker = LatencyTracker::new();
        let summary = tracker.summary();
        assert_eq!(summary.count, 0);
        assert_eq!(summary.p50, 0);
        assert_eq!(summary.mean, 0.0);
    }

    #[test]
    fn test_percentiles_nearest_rank() {
        let mut tracker = LatencyTracker::new();
        for ms in 1..=100 {
            tracker.record(ms);
        }
        // With n=100: p50 -> index 49 -> 50, p95 -> 95, p99 -> 99.
        assert_eq!(tracker.percentile(50), 50);
        assert_eq!(tracker.percentile(95), 95);
        assert_eq!(tracker.percentile(99), 99);
        assert_eq!(tracker.percentile(100), 100);
    }

    #[test]
    fn test_single_sample() {
        let mut tracker = LatencyTracker::new();
        tracker.record(42);
        assert_eq!(tracker.percentile(50), 42);
        assert_eq!(tracker.percentile(99), 42);
        assert_eq!(tracker.mean(), 42.0);
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut tracker = LatencyTracker::new();
        for ms in 0..150 {
            tracker.record(ms);
        }
        assert_eq!(tracker.count(), LATENCY_CAPACITY);
        // Oldest 50 samples evicted: window is 50..150.
        assert_eq!(tracker.percentile(1), 50);
    }

    #[test]
    fn test_mean() {
        let mut tracker = LatencyTracker::new();
        tracker.record(10);
        tracker.record(20);
        tracker.record(30);
        assert!((tracker.mean() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_clear() {
        let mut tracker = LatencyTracker::new();
        tracker.record(5);
        tracker.clear();
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn test_unsorted_input() {
        let mut tracker = LatencyTracker::new();
        for ms in [90, 10, 50, 30, 70] {
            tracker.record(ms);
        }
        // n=5: p50 -> ceil(2.5)=3 -> sorted[2] = 50.
        assert_eq!(tracker.percentile(50), 50);
    }
}
