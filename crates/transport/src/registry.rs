//! Transport Registry - scheme lookup and best-effort forwarding
//!
//! The registry maps URI schemes to `TransportFactory` implementations. It is
//! built once at startup (usually with `with_builtin`) and shared by `Arc`;
//! after that it is only read.
//!
//! # Forwarding
//!
//! `forward` never blocks and never fails. Each target is sent on its own
//! task, bounded by a registry-wide in-flight limit and a per-send timeout.
//! A target that cannot be reached is logged and counted; other targets are
//! unaffected.
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(TransportRegistry::with_builtin(ForwardOptions::default())?);
//! let transport = registry.create("tcp", Arc::new(config))?;
//! registry.forward(&targets, raw);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use url::Url;

use crate::config::{DEFAULT_FORWARD_TIMEOUT, EndpointConfig};
use crate::error::{Result, TransportError};
use crate::http::HttpFactory;
use crate::tcp::{SecureTcpFactory, TcpFactory};
use crate::udp::UdpFactory;
use crate::{Transport, TransportFactory};

/// Default bound on concurrently running forwards
pub const DEFAULT_MAX_IN_FLIGHT: usize = 256;

/// Forwarding settings
#[derive(Debug, Clone)]
pub struct ForwardOptions {
    /// Bound on one send (connect + write)
    pub timeout: Duration,

    /// Forwards running at once; more are dropped
    pub max_in_flight: usize,

    /// Client TLS used for `stcp` targets
    pub client_tls: Option<Arc<rustls::ClientConfig>>,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FORWARD_TIMEOUT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            client_tls: None,
        }
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// Forwarding counters
#[derive(Debug, Default)]
pub struct ForwardMetrics {
    /// Sends started
    pub submitted: AtomicU64,

    /// Sends that completed
    pub sent: AtomicU64,

    /// Sends that errored or timed out
    pub failed: AtomicU64,

    /// Sends never started (no runtime, in-flight limit reached)
    pub dropped: AtomicU64,
}

impl ForwardMetrics {
    pub const fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    #[inline]
    fn submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ForwardMetricsSnapshot {
        ForwardMetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of forwarding counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardMetricsSnapshot {
    pub submitted: u64,
    pub sent: u64,
    pub failed: u64,
    pub dropped: u64,
}

// =============================================================================
// Registry
// =============================================================================

/// Registry of transport factories, keyed by scheme
pub struct TransportRegistry {
    factories: HashMap<String, Arc<dyn TransportFactory>>,
    in_flight: Arc<Semaphore>,
    timeout: Duration,
    metrics: Arc<ForwardMetrics>,
}

impl TransportRegistry {
    /// Create an empty registry
    pub fn new(options: &ForwardOptions) -> Self {
        Self {
            factories: HashMap::new(),
            in_flight: Arc::new(Semaphore::new(options.max_in_flight.max(1))),
            timeout: options.timeout,
            metrics: Arc::new(ForwardMetrics::new()),
        }
    }

    /// Registry with `tcp`, `stcp`, `udp` and `http`
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built.
    pub fn with_builtin(options: ForwardOptions) -> Result<Self> {
        let mut registry = Self::new(&options);
        registry.register("tcp", TcpFactory::new(options.timeout));
        registry.register(
            "stcp",
            SecureTcpFactory::new(options.timeout, options.client_tls.clone()),
        );
        registry.register("udp", UdpFactory);
        registry.register("http", HttpFactory::new(options.timeout)?);
        Ok(registry)
    }

    /// Register a factory
    ///
    /// # Panics
    /// Panics if a factory is already registered for `scheme`.
    /// Use `try_register` for fallible registration.
    pub fn register<F: TransportFactory + 'static>(&mut self, scheme: &str, factory: F) {
        if !self.try_register(scheme, factory) {
            panic!("transport factory '{scheme}' already registered");
        }
    }

    /// Register a factory, returning `false` if the scheme is taken
    pub fn try_register<F: TransportFactory + 'static>(
        &mut self,
        scheme: &str,
        factory: F,
    ) -> bool {
        if self.factories.contains_key(scheme) {
            return false;
        }
        self.factories.insert(scheme.to_string(), Arc::new(factory));
        true
    }

    /// Create the transport for a scheme (`tcp`) or full URI (`tcp://host:514`)
    ///
    /// # Errors
    /// - `TransportError::UnknownProtocol` if no factory handles the scheme
    /// - any error the factory reports for this endpoint
    pub fn create(
        &self,
        scheme_or_uri: &str,
        config: Arc<EndpointConfig>,
    ) -> Result<Arc<dyn Transport>> {
        let scheme = scheme_of(scheme_or_uri);
        let factory = self
            .factories
            .get(scheme)
            .ok_or_else(|| TransportError::UnknownProtocol(scheme.to_string()))?;
        factory.create(config)
    }

    /// Check if a scheme is registered
    pub fn contains(&self, scheme: &str) -> bool {
        self.factories.contains_key(scheme)
    }

    /// Registered schemes, sorted
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }

    /// Forwarding counters
    pub fn metrics(&self) -> ForwardMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Send `raw` to every target without waiting
    ///
    /// Outside a tokio runtime, or with the in-flight limit reached, the
    /// send is dropped and logged.
    pub fn forward(&self, targets: &[Url], raw: Bytes) {
        let Ok(runtime) = Handle::try_current() else {
            for target in targets {
                self.metrics.dropped();
                tracing::warn!(destination = %target, "forward dropped: no async runtime");
            }
            return;
        };

        for target in targets {
            let Some(factory) = self.factories.get(target.scheme()).cloned() else {
                self.metrics.failed();
                tracing::warn!(
                    destination = %target,
                    error = %TransportError::UnknownProtocol(target.scheme().to_string()),
                    "forward failed"
                );
                continue;
            };

            let Ok(permit) = Arc::clone(&self.in_flight).try_acquire_owned() else {
                self.metrics.dropped();
                tracing::warn!(destination = %target, "forward dropped: too many in flight");
                continue;
            };

            self.metrics.submitted();
            let target = target.clone();
            let raw = raw.clone();
            let timeout = self.timeout;
            let metrics = Arc::clone(&self.metrics);

            runtime.spawn(async move {
                let result = tokio::time::timeout(timeout, factory.forward(&target, raw))
                    .await
                    .unwrap_or(Err(TransportError::Timeout));
                match result {
                    Ok(()) => {
                        metrics.sent();
                        tracing::trace!(destination = %target, "forwarded");
                    }
                    Err(e) => {
                        metrics.failed();
                        tracing::warn!(destination = %target, error = %e, "forward failed");
                    }
                }
                drop(permit);
            });
        }
    }
}

/// Scheme part of `tcp://...`, or the input itself
fn scheme_of(scheme_or_uri: &str) -> &str {
    scheme_or_uri
        .split_once("://")
        .map_or(scheme_or_uri, |(scheme, _)| scheme)
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
