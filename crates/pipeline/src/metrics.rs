//! Endpoint listener metrics
//!
//! Atomic counters for one listener. All operations use relaxed ordering;
//! values are eventually consistent, not real-time.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for one endpoint listener
#[derive(Debug, Default)]
pub struct ListenerMetrics {
    /// Events handed to the action chain
    events_dispatched: AtomicU64,

    /// Action invocations that returned an error or panicked
    action_failures: AtomicU64,

    /// Transport restarts performed by the supervisor
    restarts: AtomicU64,
}

impl ListenerMetrics {
    /// Create new metrics instance with all counters at zero
    #[inline]
    pub const fn new() -> Self {
        Self {
            events_dispatched: AtomicU64::new(0),
            action_failures: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
        }
    }

    /// Record one dispatched event and the actions that failed on it
    #[inline]
    pub fn record_dispatch(&self, failures: u64) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
        if failures > 0 {
            self.action_failures.fetch_add(failures, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    #[inline]
    pub fn snapshot(&self) -> ListenerMetricsSnapshot {
        ListenerMetricsSnapshot {
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            action_failures: self.action_failures.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of listener metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerMetricsSnapshot {
    pub events_dispatched: u64,
    pub action_failures: u64,
    pub restarts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zero() {
        assert_eq!(ListenerMetrics::new().snapshot(), ListenerMetricsSnapshot::default());
    }

    #[test]
    fn test_record_dispatch() {
        let metrics = ListenerMetrics::new();
        metrics.record_dispatch(0);
        metrics.record_dispatch(2);
        metrics.record_restart();

        let s = metrics.snapshot();
        assert_eq!(s.events_dispatched, 2);
        assert_eq!(s.action_failures, 2);
        assert_eq!(s.restarts, 1);
    }
}
