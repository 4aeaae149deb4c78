//! Transport supervisor
//!
//! Runs `Transport::start` and restarts it when it fails (bind errors,
//! fatal accept errors). Delays grow exponentially from
//! `initial_backoff`, doubling up to `max_backoff`. After `max_restarts`
//! consecutive failures the endpoint is given up on.
//!
//! A run that stayed up for at least `max_backoff` before failing counts as
//! healthy: the failure streak and the delay start over.

use std::sync::Arc;
use std::time::Duration;

use atna_protocol::TransportEvent;
use atna_transport::Transport;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::metrics::ListenerMetrics;

/// Default delay before the first restart
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Default upper bound on the restart delay
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Default number of consecutive restarts before giving up
pub const DEFAULT_MAX_RESTARTS: u32 = 5;

/// When and how often a failed transport is restarted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Restart at all
    pub enabled: bool,

    /// Consecutive restarts before giving up (0 = fail on first error)
    pub max_restarts: u32,

    pub initial_backoff: Duration,

    pub max_backoff: Duration,
}

impl RestartPolicy {
    /// Never restart
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    /// Whether another restart is allowed after `restarts` consecutive ones
    #[inline]
    pub fn allows(&self, restarts: u32) -> bool {
        self.enabled && restarts < self.max_restarts
    }

    /// Delay before restart number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_restarts: DEFAULT_MAX_RESTARTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// How supervision ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Stopped on request, or the transport exited cleanly
    Stopped,

    /// Restart policy exhausted; carries the last error
    Failed(String),
}

/// Run `transport` until cancelled or the restart policy gives up
pub(crate) async fn supervise(
    endpoint: &str,
    transport: Arc<dyn Transport>,
    events: mpsc::Sender<TransportEvent>,
    policy: RestartPolicy,
    metrics: Arc<ListenerMetrics>,
    cancel: CancellationToken,
) -> SupervisorExit {
    let mut restarts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return SupervisorExit::Stopped;
        }

        let started = Instant::now();
        let error = match transport.start(events.clone()).await {
            Ok(()) => {
                if !cancel.is_cancelled() {
                    tracing::warn!(endpoint, "transport exited");
                }
                return SupervisorExit::Stopped;
            }
            Err(e) => e,
        };

        if cancel.is_cancelled() {
            return SupervisorExit::Stopped;
        }

        if started.elapsed() >= policy.max_backoff {
            restarts = 0;
        }

        if !policy.allows(restarts) {
            tracing::error!(
                endpoint,
                error = %error,
                restarts,
                "transport failed, giving up"
            );
            return SupervisorExit::Failed(error.to_string());
        }

        restarts += 1;
        metrics.record_restart();
        let delay = policy.delay(restarts);

        tracing::warn!(
            endpoint,
            error = %error,
            attempt = restarts,
            max_restarts = policy.max_restarts,
            delay_ms = delay.as_millis() as u64,
            "transport failed, restarting"
        );

        tokio::select! {
            _ = cancel.cancelled() => return SupervisorExit::Stopped,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RestartPolicy::default();
        assert!(policy.enabled);
        assert_eq!(policy.max_restarts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_secs(1));
        assert_eq!(policy.max_backoff, Duration::from_secs(30));
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RestartPolicy::default();
        let delays: Vec<u64> = (1..=8).map(|n| policy.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);

        // Large attempt numbers do not overflow
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_allows() {
        let policy = RestartPolicy::default().with_max_restarts(2);
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));

        assert!(!RestartPolicy::default().with_max_restarts(0).allows(0));
        assert!(!RestartPolicy::disabled().allows(0));
    }

    #[test]
    fn test_with_backoff_keeps_max_above_initial() {
        let policy = RestartPolicy::default()
            .with_backoff(Duration::from_secs(10), Duration::from_secs(5));
        assert_eq!(policy.max_backoff, Duration::from_secs(10));
        assert_eq!(policy.delay(3), Duration::from_secs(10));
    }
}
