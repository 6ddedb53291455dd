//! Watchdog metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Watchdog metrics.
#[derive(Debug, Default)]
pub struct WatchdogMetrics {
    /// Iterations that reached their end boundary with a recorded start.
    pub iterations_completed: AtomicU64,

    /// Hang sessions started (monitor tasks dispatched).
    pub sessions_started: AtomicU64,

    /// Iterations left unmonitored because no semaphore could be created.
    pub sessions_skipped: AtomicU64,

    /// Distinct hangs with at least one continuous notification.
    pub hangs_detected: AtomicU64,

    /// Total continuous notification rounds.
    pub hang_notifications: AtomicU64,

    /// Total completion notification rounds.
    pub completion_notifications: AtomicU64,

    /// Longest completed iteration (microseconds).
    pub longest_iteration_us: AtomicU64,

    /// Start time.
    start_time: parking_lot::RwLock<Option<Instant>>,
}

impl WatchdogMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of observation. Later calls keep the first mark.
    pub fn mark_start(&self) {
        let mut start_time = self.start_time.write();
        if start_time.is_none() {
            *start_time = Some(Instant::now());
        }
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .read()
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Record a completed iteration and its duration.
    pub fn record_iteration(&self, duration: Duration) {
        self.iterations_completed.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.longest_iteration_us.fetch_max(micros, Ordering::Relaxed);
    }

    /// Record a dispatched monitor task.
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an iteration that could not be monitored.
    pub fn record_session_skipped(&self) {
        self.sessions_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a continuous notification round. `first` marks the first
    /// round of a hang.
    pub fn record_hang_notification(&self, first: bool) {
        if first {
            self.hangs_detected.fetch_add(1, Ordering::Relaxed);
        }
        self.hang_notifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completion notification round.
    pub fn record_completion_notification(&self) {
        self.completion_notifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of the metrics.
    pub fn snapshot(&self) -> WatchdogMetricsSnapshot {
        WatchdogMetricsSnapshot {
            timestamp: Utc::now(),
            uptime_secs: self.uptime_secs(),
            iterations_completed: self.iterations_completed.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_skipped: self.sessions_skipped.load(Ordering::Relaxed),
            hangs_detected: self.hangs_detected.load(Ordering::Relaxed),
            hang_notifications: self.hang_notifications.load(Ordering::Relaxed),
            completion_notifications: self.completion_notifications.load(Ordering::Relaxed),
            longest_iteration_us: self.longest_iteration_us.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct WatchdogMetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
    pub iterations_completed: u64,
    pub sessions_started: u64,
    pub sessions_skipped: u64,
    pub hangs_detected: u64,
    pub hang_notifications: u64,
    pub completion_notifications: u64,
    pub longest_iteration_us: u64,
}

impl WatchdogMetricsSnapshot {
    /// Fraction of monitored sessions that turned into a hang.
    pub fn hang_ratio(&self) -> f64 {
        if self.sessions_started == 0 {
            return 0.0;
        }
        self.hangs_detected as f64 / self.sessions_started as f64
    }

    /// Average number of continuous notification rounds per hang.
    pub fn avg_notifications_per_hang(&self) -> f64 {
        if self.hangs_detected == 0 {
            return 0.0;
        }
        self.hang_notifications as f64 / self.hangs_detected as f64
    }

    /// Longest completed iteration in milliseconds.
    pub fn longest_iteration_ms(&self) -> f64 {
        self.longest_iteration_us as f64 / 1000.0
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
