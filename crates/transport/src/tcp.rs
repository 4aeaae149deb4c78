//! Streaming transports: plain TCP and TLS TCP (`stcp`)
//!
//! Both share one accept loop. Each accepted connection is served by its
//! own task running a `Session`; the number of live connections is bounded
//! by a semaphore, and the accept loop waits for a permit before accepting.
//!
//! For `stcp` the TLS handshake runs first, bounded by the read timeout. A
//! failed handshake raises a `SecurityAlert` and the connection is closed
//! without reading any frame.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atna_protocol::{SecurityAlert, TransportEvent};
use bytes::Bytes;
use rustls::pki_types::ServerName;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::common::{Lifecycle, TransportMetrics, TransportMetricsSnapshot, within};
use crate::config::{DEFAULT_FORWARD_TIMEOUT, EndpointConfig, socket_address};
use crate::error::{Result, TransportError};
use crate::session::Session;
use crate::tls;
use crate::{Transport, TransportFactory};

// =============================================================================
// Constants
// =============================================================================

/// Keepalive idle time for accepted connections
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

// =============================================================================
// Accept loop
// =============================================================================

/// Listener shared by the TCP and TLS TCP transports
struct StreamServer {
    config: Arc<EndpointConfig>,
    tls: Option<TlsAcceptor>,
    metrics: Arc<TransportMetrics>,
    lifecycle: Lifecycle,
}

impl StreamServer {
    fn new(config: Arc<EndpointConfig>, tls: Option<TlsAcceptor>) -> Self {
        Self {
            config,
            tls,
            metrics: Arc::new(TransportMetrics::new()),
            lifecycle: Lifecycle::default(),
        }
    }

    fn kind(&self) -> &'static str {
        if self.tls.is_some() { "stcp" } else { "tcp" }
    }

    async fn run(&self, events: mpsc::Sender<TransportEvent>) -> Result<()> {
        if self.lifecycle.is_stopped() {
            return Ok(());
        }

        let bind_addr = self.config.bind_address()?;
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| TransportError::Bind {
                address: bind_addr.clone(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        self.lifecycle.started(local_addr);

        tracing::info!(
            endpoint = %self.config.name,
            transport = self.kind(),
            address = %local_addr,
            max_connections = self.config.max_connections,
            max_message_size = self.config.max_message_size,
            "listening"
        );

        let cancel = self.lifecycle.token();
        let permits = Arc::new(Semaphore::new(self.config.max_connections.max(1)));

        loop {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    self.metrics.connection_opened();
                    self.configure_socket(&stream);

                    let connection = Connection {
                        config: Arc::clone(&self.config),
                        tls: self.tls.clone(),
                        events: events.clone(),
                        metrics: Arc::clone(&self.metrics),
                        cancel: cancel.clone(),
                        peer_addr,
                        local_addr,
                    };

                    tokio::spawn(async move {
                        connection.handle(stream).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        endpoint = %self.config.name,
                        error = %e,
                        "accept error"
                    );
                    self.metrics.error();
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        self.lifecycle.finished();
        tracing::info!(
            endpoint = %self.config.name,
            transport = self.kind(),
            "listener stopped"
        );
        Ok(())
    }

    /// Apply nodelay, buffer sizes and keepalive
    fn configure_socket(&self, stream: &TcpStream) {
        if self.config.nodelay
            && let Err(e) = stream.set_nodelay(true)
        {
            tracing::warn!(error = %e, "failed to set TCP_NODELAY");
        }

        let socket = SockRef::from(stream);
        if let Err(e) = socket.set_recv_buffer_size(self.config.socket_buffer_size) {
            tracing::warn!(error = %e, "failed to set SO_RCVBUF");
        }
        if let Err(e) = socket.set_send_buffer_size(self.config.socket_buffer_size) {
            tracing::warn!(error = %e, "failed to set SO_SNDBUF");
        }

        let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_INTERVAL);
        if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
            tracing::warn!(error = %e, "failed to set TCP keepalive");
        }
    }
}

// =============================================================================
// Connection Handler
// =============================================================================

/// One accepted connection
struct Connection {
    config: Arc<EndpointConfig>,
    tls: Option<TlsAcceptor>,
    events: mpsc::Sender<TransportEvent>,
    metrics: Arc<TransportMetrics>,
    cancel: CancellationToken,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl Connection {
    async fn handle(self, stream: TcpStream) {
        match self.tls.clone() {
            None => {
                self.session().run(stream).await;
            }
            Some(acceptor) => self.handle_tls(acceptor, stream).await,
        }
        self.metrics.connection_closed();
    }

    async fn handle_tls(&self, acceptor: TlsAcceptor, stream: TcpStream) {
        let handshake = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            result = within(self.config.read_timeout(), async {
                acceptor.accept(stream).await.map_err(TransportError::from)
            }) => result,
        };

        match handshake {
            Ok(tls_stream) => {
                let peer_certificate = tls::peer_certificate(tls_stream.get_ref().1);
                tracing::debug!(
                    endpoint = %self.config.name,
                    peer = %self.peer_addr,
                    thumbprint = peer_certificate.as_ref().map_or("-", |c| c.thumbprint.as_str()),
                    "TLS session established"
                );
                self.session()
                    .with_peer_certificate(peer_certificate)
                    .run(tls_stream)
                    .await;
            }
            Err(e) => {
                self.metrics.security_alert();
                tracing::warn!(
                    endpoint = %self.config.name,
                    peer = %self.peer_addr,
                    error = %e,
                    "TLS handshake failed"
                );
                let alert = SecurityAlert::new(self.peer_addr, self.local_addr, e.to_string());
                let _ = self
                    .events
                    .send(TransportEvent::SecurityAlert(alert))
                    .await;
            }
        }
    }

    fn session(&self) -> Session {
        Session::new(
            Arc::clone(&self.config),
            self.events.clone(),
            Arc::clone(&self.metrics),
            self.cancel.clone(),
            self.peer_addr,
            self.local_addr,
        )
    }
}

// =============================================================================
// Forwarding
// =============================================================================

/// Send one octet-counted frame to a stream target
async fn forward_stream(
    target: &Url,
    raw: Bytes,
    timeout: Duration,
    connector: Option<&TlsConnector>,
) -> Result<()> {
    let address = socket_address(target)?;

    within(Some(timeout), async {
        let stream = TcpStream::connect(&address).await?;
        match connector {
            None => write_frame(stream, &raw).await,
            Some(connector) => {
                let host = target
                    .host_str()
                    .unwrap_or_default()
                    .trim_start_matches('[')
                    .trim_end_matches(']')
                    .to_owned();
                let server_name = ServerName::try_from(host)
                    .map_err(|e| TransportError::invalid_address(target.as_str(), e.to_string()))?;
                let stream = connector.connect(server_name, stream).await?;
                write_frame(stream, &raw).await
            }
        }
    })
    .await
}

async fn write_frame<W>(mut stream: W, raw: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let prefix = format!("{} ", raw.len());
    stream.write_all(prefix.as_bytes()).await?;
    stream.write_all(raw).await?;
    stream.flush().await?;
    stream.shutdown().await?;
    Ok(())
}

fn connector_required() -> TransportError {
    TransportError::configuration("stcp forwarding requires a client TLS configuration")
}

// =============================================================================
// TCP
// =============================================================================

/// Plain TCP transport
pub struct TcpTransport {
    server: StreamServer,
}

impl TcpTransport {
    pub fn new(config: Arc<EndpointConfig>) -> Self {
        Self {
            server: StreamServer::new(config, None),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn scheme(&self) -> &'static str {
        "tcp"
    }

    async fn start(&self, events: mpsc::Sender<TransportEvent>) -> Result<()> {
        self.server.run(events).await
    }

    fn stop(&self) {
        self.server.lifecycle.stop();
    }

    fn is_running(&self) -> bool {
        self.server.lifecycle.is_running()
    }

    async fn forward(&self, target: &Url, raw: Bytes) -> Result<()> {
        forward_stream(target, raw, DEFAULT_FORWARD_TIMEOUT, None).await
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lifecycle.local_addr()
    }

    fn metrics(&self) -> TransportMetricsSnapshot {
        self.server.metrics.snapshot()
    }
}

/// Factory for `tcp` endpoints and targets
#[derive(Debug, Clone)]
pub struct TcpFactory {
    forward_timeout: Duration,
}

impl TcpFactory {
    pub fn new(forward_timeout: Duration) -> Self {
        Self { forward_timeout }
    }
}

impl Default for TcpFactory {
    fn default() -> Self {
        Self::new(DEFAULT_FORWARD_TIMEOUT)
    }
}

#[async_trait]
impl TransportFactory for TcpFactory {
    fn scheme(&self) -> &'static str {
        "tcp"
    }

    fn create(&self, config: Arc<EndpointConfig>) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(TcpTransport::new(config)))
    }

    async fn forward(&self, target: &Url, raw: Bytes) -> Result<()> {
        forward_stream(target, raw, self.forward_timeout, None).await
    }
}

// =============================================================================
// TLS TCP
// =============================================================================

/// TLS TCP transport (`stcp`)
pub struct SecureTcpTransport {
    server: StreamServer,
    connector: Option<TlsConnector>,
}

impl SecureTcpTransport {
    /// Create the transport, loading the server certificate and trust settings
    ///
    /// Fails when the endpoint has no TLS section or the certificates cannot
    /// be loaded.
    pub fn new(config: Arc<EndpointConfig>) -> Result<Self> {
        let settings = config.tls.as_ref().ok_or_else(|| {
            TransportError::configuration(format!(
                "endpoint '{}' uses stcp but has no TLS settings",
                config.name
            ))
        })?;
        let acceptor = TlsAcceptor::from(tls::build_server_config(settings)?);

        Ok(Self {
            server: StreamServer::new(config, Some(acceptor)),
            connector: None,
        })
    }

    /// Client TLS used by `forward`
    #[must_use]
    pub fn with_connector(mut self, connector: Option<TlsConnector>) -> Self {
        self.connector = connector;
        self
    }
}

#[async_trait]
impl Transport for SecureTcpTransport {
    fn scheme(&self) -> &'static str {
        "stcp"
    }

    async fn start(&self, events: mpsc::Sender<TransportEvent>) -> Result<()> {
        self.server.run(events).await
    }

    fn stop(&self) {
        self.server.lifecycle.stop();
    }

    fn is_running(&self) -> bool {
        self.server.lifecycle.is_running()
    }

    async fn forward(&self, target: &Url, raw: Bytes) -> Result<()> {
        let connector = self.connector.as_ref().ok_or_else(connector_required)?;
        forward_stream(target, raw, DEFAULT_FORWARD_TIMEOUT, Some(connector)).await
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lifecycle.local_addr()
    }

    fn metrics(&self) -> TransportMetricsSnapshot {
        self.server.metrics.snapshot()
    }
}

/// Factory for `stcp` endpoints and targets
#[derive(Clone)]
pub struct SecureTcpFactory {
    forward_timeout: Duration,
    connector: Option<TlsConnector>,
}

impl SecureTcpFactory {
    /// `client` is the TLS configuration used for forwarding, if any
    pub fn new(forward_timeout: Duration, client: Option<Arc<rustls::ClientConfig>>) -> Self {
        Self {
            forward_timeout,
            connector: client.map(TlsConnector::from),
        }
    }
}

#[async_trait]
impl TransportFactory for SecureTcpFactory {
    fn scheme(&self) -> &'static str {
        "stcp"
    }

    fn create(&self, config: Arc<EndpointConfig>) -> Result<Arc<dyn Transport>> {
        let transport = SecureTcpTransport::new(config)?.with_connector(self.connector.clone());
        Ok(Arc::new(transport))
    }

    async fn forward(&self, target: &Url, raw: Bytes) -> Result<()> {
        let connector = self.connector.as_ref().ok_or_else(connector_required)?;
        forward_stream(target, raw, self.forward_timeout, Some(connector)).await
    }
}

#[cfg(test)]
#[path = "tcp_test.rs"]
mod tcp_test;
