//! ATNA Transport - Wire transports for the audit collector
//!
//! Every endpoint listens through exactly one transport, selected by the
//! scheme of its address URI:
//!
//! | Scheme | Transport | Framing |
//! |--------|-----------|---------|
//! | `tcp`  | `TcpTransport` | octet counting or newline, per connection |
//! | `stcp` | `SecureTcpTransport` | same as `tcp`, after a TLS handshake |
//! | `udp`  | `UdpTransport` | one datagram = one message |
//! | `http` | `HttpTransport` | one POST body = one message |
//!
//! # Architecture
//!
//! ```text
//! [Peer] --bytes--> [Transport] --TransportEvent--> [mpsc] --> [Endpoint Listener]
//!                        |
//!                 [Session (streams)]
//! ```
//!
//! Transports never call actions directly. They decode what arrives and hand
//! `TransportEvent`s to the listener over a channel. A malformed frame or a
//! failed peer only ever affects its own connection or datagram.
//!
//! # Forwarding
//!
//! `TransportRegistry::forward` re-sends raw bytes to downstream collectors.
//! It returns immediately; each target is sent on its own task and failures
//! are only logged.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use atna_protocol::TransportEvent;
use bytes::Bytes;
use tokio::sync::mpsc;
use url::Url;

mod common;
mod error;
mod http;
mod registry;
mod session;
mod tcp;
mod udp;

pub mod config;
pub mod tls;

#[cfg(test)]
mod test_certs;

pub use common::{TransportMetrics, TransportMetricsSnapshot};
pub use config::{EndpointConfig, TlsSettings};
pub use error::{Result, TransportError};
pub use http::{HttpFactory, HttpTransport};
pub use registry::{
    DEFAULT_MAX_IN_FLIGHT, ForwardMetrics, ForwardMetricsSnapshot, ForwardOptions, TransportRegistry,
};
pub use session::{Session, SessionEnd};
pub use tcp::{SecureTcpFactory, SecureTcpTransport, TcpFactory, TcpTransport};
pub use udp::{MAX_DATAGRAM_SIZE, UdpFactory, UdpTransport};

/// A wire transport bound to one endpoint
///
/// `start` blocks until `stop` is called (or a fatal error occurs) and must
/// return promptly after `stop` from any task. A stopped transport does not
/// start again.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Scheme this transport serves (`tcp`, `stcp`, `udp`, `http`)
    fn scheme(&self) -> &'static str;

    /// Bind and serve, sending every decoded unit to `events`
    async fn start(&self, events: mpsc::Sender<TransportEvent>) -> Result<()>;

    /// Signal the serve loop to exit
    fn stop(&self);

    /// Whether the serve loop is currently running
    fn is_running(&self) -> bool;

    /// Send raw bytes to a remote collector using this transport's wire format
    async fn forward(&self, target: &Url, raw: Bytes) -> Result<()>;

    /// Bound address once listening
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Current counters
    fn metrics(&self) -> TransportMetricsSnapshot;
}

/// Creates transports for one scheme and forwards to targets of that scheme
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Scheme this factory registers under
    fn scheme(&self) -> &'static str;

    /// Create a transport for an endpoint
    ///
    /// Fails if the endpoint configuration is unusable for this transport
    /// (for example `stcp` without a server certificate).
    fn create(&self, config: Arc<EndpointConfig>) -> Result<Arc<dyn Transport>>;

    /// Send raw bytes to `target`
    async fn forward(&self, target: &Url, raw: Bytes) -> Result<()>;
}
