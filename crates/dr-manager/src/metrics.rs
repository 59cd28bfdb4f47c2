//! Performance bookkeeping for a manager's lifetime.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use serde::Serialize;

/// Number of render times kept for the rolling statistics.
const RENDER_TIME_WINDOW: usize = 1000;

/// In-memory counters, reset only by [`PerformanceMetrics::reset`].
#[derive(Debug, Default)]
pub(crate) struct PerformanceMetrics {
    total_requests: u64,
    cache_hits: u64,
    cache_misses: u64,
    successes: BTreeMap<String, u64>,
    failures: BTreeMap<String, u64>,
    render_times: VecDeque<Duration>,
}

impl PerformanceMetrics {
    pub fn record_request(&mut self) {
        self.total_requests += 1;
    }

    pub fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn record_cache_miss(&mut self) {
        self.cache_misses += 1;
    }

    pub fn record_success(&mut self, renderer: &str, elapsed: Duration) {
        *self.successes.entry(renderer.to_owned()).or_default() += 1;
        if self.render_times.len() == RENDER_TIME_WINDOW {
            self.render_times.pop_front();
        }
        self.render_times.push_back(elapsed);
    }

    pub fn record_failure(&mut self, renderer: &str) {
        *self.failures.entry(renderer.to_owned()).or_default() += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let ms = |d: &Duration| d.as_secs_f64() * 1000.0;
        let samples = self.render_times.len();
        #[allow(clippy::cast_precision_loss)]
        let average_render_ms = if samples == 0 {
            0.0
        } else {
            self.render_times.iter().map(ms).sum::<f64>() / samples as f64
        };

        MetricsSnapshot {
            total_requests: self.total_requests,
            cache_hits: self.cache_hits,
            cache_misses: self.cache_misses,
            successful_renders: self.successes.values().sum(),
            failed_attempts: self.failures.values().sum(),
            renders_by_renderer: self.successes.clone(),
            failures_by_renderer: self.failures.clone(),
            render_time_samples: samples,
            average_render_ms,
            min_render_ms: self.render_times.iter().map(ms).reduce(f64::min).unwrap_or(0.0),
            max_render_ms: self.render_times.iter().map(ms).reduce(f64::max).unwrap_or(0.0),
        }
    }
}

/// Point-in-time copy of a manager's performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub successful_renders: u64,
    pub failed_attempts: u64,
    pub renders_by_renderer: BTreeMap<String, u64>,
    pub failures_by_renderer: BTreeMap<String, u64>,
    /// Number of render times in the rolling window.
    pub render_time_samples: usize,
    pub average_render_ms: f64,
    pub min_render_ms: f64,
    pub max_render_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let metrics = PerformanceMetrics::default();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_render_time_statistics() {
        let mut metrics = PerformanceMetrics::default();
        metrics.record_success("a", Duration::from_millis(10));
        metrics.record_success("a", Duration::from_millis(30));
        metrics.record_success("b", Duration::from_millis(20));
        metrics.record_failure("c");

        let snap = metrics.snapshot();
        assert_eq!(snap.successful_renders, 3);
        assert_eq!(snap.failed_attempts, 1);
        assert_eq!(snap.renders_by_renderer.get("a"), Some(&2));
        assert_eq!(snap.failures_by_renderer.get("c"), Some(&1));
        assert!((snap.average_render_ms - 20.0).abs() < 1e-6);
        assert!((snap.min_render_ms - 10.0).abs() < 1e-6);
        assert!((snap.max_render_ms - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_render_time_window_is_bounded() {
        let mut metrics = PerformanceMetrics::default();
        for _ in 0..(RENDER_TIME_WINDOW + 10) {
            metrics.record_success("a", Duration::from_millis(1));
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.render_time_samples, RENDER_TIME_WINDOW);
        assert_eq!(snap.successful_renders, (RENDER_TIME_WINDOW + 10) as u64);
    }

    #[test]
    fn test_reset() {
        let mut metrics = PerformanceMetrics::default();
        metrics.record_request();
        metrics.record_cache_hit();
        metrics.reset();
        assert_eq!(metrics.snapshot().total_requests, 0);
    }
}
