//! Common types and utilities for transports
//!
//! Shared functionality across all transport types (TCP, TLS, UDP, HTTP)

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransportError};

/// Metrics shared by all transport types
#[derive(Debug, Default)]
pub struct TransportMetrics {
    /// Currently active connections
    pub connections_active: AtomicU64,

    /// Total connections accepted
    pub connections_total: AtomicU64,

    /// Messages decoded successfully
    pub messages_received: AtomicU64,

    /// Frames that failed framing or decoding
    pub invalid_messages: AtomicU64,

    /// Total bytes received
    pub bytes_received: AtomicU64,

    /// Failed TLS handshakes and rejected peers
    pub security_alerts: AtomicU64,

    /// Total errors encountered
    pub errors: AtomicU64,
}

impl TransportMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            invalid_messages: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            security_alerts: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Increment active connections
    #[inline]
    pub fn connection_opened(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active connections
    #[inline]
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn bytes_read(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn message_invalid(&self) {
        self.invalid_messages.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn security_alert(&self) {
        self.security_alerts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record error
    #[inline]
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> TransportMetricsSnapshot {
        TransportMetricsSnapshot {
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            invalid_messages: self.invalid_messages.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            security_alerts: self.security_alerts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of transport metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportMetricsSnapshot {
    pub connections_active: u64,
    pub connections_total: u64,
    pub messages_received: u64,
    pub invalid_messages: u64,
    pub bytes_received: u64,
    pub security_alerts: u64,
    pub errors: u64,
}

/// Running state shared by every transport
///
/// `stop` is permanent: the cancellation token stays cancelled, so a later
/// `start` returns immediately.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    running: AtomicBool,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Lifecycle {
    /// Record the bound address and mark running
    pub fn started(&self, addr: SocketAddr) {
        *self.local_addr.lock() = Some(addr);
        self.running.store(true, Ordering::Relaxed);
    }

    /// Mark the serve loop as exited
    pub fn finished(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.cancel.cancel();
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Token observed by accept and read loops
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Run `fut` with an optional deadline
pub(crate) async fn within<F, T>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TransportError::Timeout)?,
        None => fut.await,
    }
}

/// Duration as an optional limit (zero = no limit)
#[inline]
pub(crate) fn limit(d: Duration) -> Option<Duration> {
    if d.is_zero() { None } else { Some(d) }
}

/// Check if error is a connection reset (expected when peers hang up)
pub(crate) fn is_connection_reset(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// Trim trailing newline from a datagram (LF or CRLF)
#[inline]
pub(crate) fn trim_trailing_newline(data: &[u8]) -> &[u8] {
    let mut end = data.len();

    if end > 0 && data[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && data[end - 1] == b'\r' {
            end -= 1;
        }
    }

    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_connection_tracking() {
        let metrics = TransportMetrics::new();

        metrics.connection_opened();
        metrics.connection_opened();
        assert_eq!(metrics.connections_active.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.connections_total.load(Ordering::Relaxed), 2);

        metrics.connection_closed();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_active, 1);
        assert_eq!(snapshot.connections_total, 2);
    }

    #[test]
    fn test_metrics_message_tracking() {
        let metrics = TransportMetrics::new();

        metrics.bytes_read(100);
        metrics.bytes_read(200);
        metrics.message_received();
        metrics.message_invalid();
        metrics.security_alert();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bytes_received, 300);
        assert_eq!(snapshot.messages_received, 1);
        assert_eq!(snapshot.invalid_messages, 1);
        assert_eq!(snapshot.security_alerts, 1);
    }

    #[test]
    fn test_trim_trailing_newline() {
        assert_eq!(trim_trailing_newline(b"abc\r\n"), b"abc");
        assert_eq!(trim_trailing_newline(b"abc\n"), b"abc");
        assert_eq!(trim_trailing_newline(b"abc\r"), b"abc\r");
        assert_eq!(trim_trailing_newline(b""), b"");
    }

    #[test]
    fn test_lifecycle_stop_is_permanent() {
        let lifecycle = Lifecycle::default();
        assert!(!lifecycle.is_running());
        assert!(lifecycle.local_addr().is_none());

        let addr: SocketAddr = "127.0.0.1:514".parse().unwrap();
        lifecycle.started(addr);
        assert!(lifecycle.is_running());
        assert_eq!(lifecycle.local_addr(), Some(addr));

        lifecycle.stop();
        assert!(!lifecycle.is_running());
        assert!(lifecycle.is_stopped());
        assert!(lifecycle.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_within_deadline() {
        let slow = within(Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(slow, Err(TransportError::Timeout)));

        let fast = within(None, async { Ok(7) }).await;
        assert_eq!(fast.unwrap(), 7);
    }

    #[test]
    fn test_is_connection_reset() {
        assert!(is_connection_reset(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_connection_reset(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
