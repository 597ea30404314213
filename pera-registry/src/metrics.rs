use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// A point-in-time view of a [`ToolMetrics`], cheap to clone and hand to a
/// ranking computation without holding the underlying lock.
#[derive(Debug, Clone, Copy)]
pub struct ToolMetricsSnapshot {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub cumulative_time: Duration,
    pub last_execution: Option<DateTime<Utc>>,
}

impl ToolMetricsSnapshot {
    #[must_use]
    pub fn success_rate(&self) -> f32 {
        if self.total == 0 {
            0.5
        } else {
            self.successes as f32 / self.total as f32
        }
    }

    #[must_use]
    pub fn mean_duration(&self) -> Duration {
        if self.total == 0 {
            Duration::ZERO
        } else {
            self.cumulative_time / u32::try_from(self.total).unwrap_or(u32::MAX)
        }
    }
}

/// Atomic running metrics for one tool: totals, successes, failures,
/// cumulative execution time, and the timestamp of the last run.
///
/// Every field update happens through [`ToolMetrics::record`], which is
/// called once per `execute` under `safe_execute` — the data model's
/// "metrics update is atomic per tool" rule, satisfied without taking a
/// lock on the hot path (only `last_execution` needs one, since
/// `DateTime<Utc>` doesn't fit in an atomic word).
#[derive(Debug, Default)]
pub struct ToolMetrics {
    total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    cumulative_nanos: AtomicU64,
    last_execution: RwLock<Option<DateTime<Utc>>>,
}

impl ToolMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, success: bool, duration: Duration) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.cumulative_nanos.fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        *self.last_execution.write() = Some(Utc::now());
    }

    #[must_use]
    pub fn snapshot(&self) -> ToolMetricsSnapshot {
        ToolMetricsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cumulative_time: Duration::from_nanos(self.cumulative_nanos.load(Ordering::Relaxed)),
            last_execution: *self.last_execution.read(),
        }
    }

    #[must_use]
    pub fn successful_executions(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_defaults_neutral_with_no_samples() {
        let metrics = ToolMetrics::new();
        assert_eq!(metrics.snapshot().success_rate(), 0.5);
    }

    #[test]
    fn success_rate_tracks_recorded_outcomes() {
        let metrics = ToolMetrics::new();
        metrics.record(true, Duration::from_millis(10));
        metrics.record(true, Duration::from_millis(20));
        metrics.record(false, Duration::from_millis(30));
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total, 3);
        assert!((snapshot.success_rate() - (2.0 / 3.0)).abs() < 1e-6);
    }

    #[test]
    fn mean_duration_averages_cumulative_time() {
        let metrics = ToolMetrics::new();
        metrics.record(true, Duration::from_millis(100));
        metrics.record(true, Duration::from_millis(300));
        assert_eq!(metrics.snapshot().mean_duration(), Duration::from_millis(200));
    }
}
