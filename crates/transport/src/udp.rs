//! UDP transport
//!
//! One datagram is one complete message; there is no reassembly. The
//! receive buffer is one byte larger than `max_message_size` (capped at the
//! largest datagram), so a datagram that fills it is known to be oversize and
//! is rejected as invalid rather than truncated. Every datagram gets its own
//! session id.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use atna_protocol::{
    FramingError, InvalidMessageEvent, MessageEvent, RawMessage, SessionId, TransportEvent,
    decode_syslog,
};
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{UdpSocket, lookup_host};
use tokio::sync::mpsc;
use url::Url;

use crate::common::{
    Lifecycle, TransportMetrics, TransportMetricsSnapshot, trim_trailing_newline, within,
};
use crate::config::{DEFAULT_FORWARD_TIMEOUT, EndpointConfig, socket_address};
use crate::error::{Result, TransportError};
use crate::{Transport, TransportFactory};

/// Largest payload a UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// UDP transport
pub struct UdpTransport {
    config: Arc<EndpointConfig>,
    metrics: Arc<TransportMetrics>,
    lifecycle: Lifecycle,
}

impl UdpTransport {
    pub fn new(config: Arc<EndpointConfig>) -> Self {
        Self {
            config,
            metrics: Arc::new(TransportMetrics::new()),
            lifecycle: Lifecycle::default(),
        }
    }

    /// Bind with an enlarged receive buffer
    fn bind_socket(&self, addr: SocketAddr) -> std::io::Result<UdpSocket> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;

        if let Err(e) = socket.set_recv_buffer_size(self.config.socket_buffer_size) {
            tracing::warn!(
                error = %e,
                requested_size = self.config.socket_buffer_size,
                "failed to set UDP SO_RCVBUF"
            );
        }

        socket.bind(&addr.into())?;
        socket.set_nonblocking(true)?;
        UdpSocket::from_std(socket.into())
    }

    async fn resolve_bind_address(&self) -> Result<SocketAddr> {
        let bind_addr = self.config.bind_address()?;
        lookup_host(&bind_addr)
            .await
            .map_err(|e| TransportError::Bind {
                address: bind_addr.clone(),
                source: e,
            })?
            .next()
            .ok_or_else(|| {
                TransportError::invalid_address(bind_addr.clone(), "no address resolved")
            })
    }

    /// Turn one datagram into an event
    fn event_for(&self, datagram: &[u8], peer: SocketAddr, local: SocketAddr) -> TransportEvent {
        let limit = self.config.max_message_size;
        let session = SessionId::new();

        if datagram.len() > limit {
            self.metrics.message_invalid();
            tracing::debug!(
                endpoint = %self.config.name,
                peer = %peer,
                size = datagram.len(),
                limit,
                "oversize datagram rejected"
            );
            let prefix = String::from_utf8_lossy(&datagram[..limit]).into_owned();
            let partial = RawMessage::builder(session)
                .body(prefix.clone())
                .original(prefix)
                .build();
            // Size is a lower bound: the buffer holds at most limit + 1 bytes
            let fault = FramingError::too_large(datagram.len(), limit);
            return TransportEvent::Invalid(InvalidMessageEvent::new(
                partial,
                peer,
                local,
                fault.to_string(),
            ));
        }

        match decode_syslog(trim_trailing_newline(datagram), session) {
            Ok(message) => {
                self.metrics.message_received();
                tracing::trace!(
                    endpoint = %self.config.name,
                    peer = %peer,
                    bytes = datagram.len(),
                    "message received"
                );
                TransportEvent::Message(MessageEvent::new(message, peer, local))
            }
            Err(failure) => {
                self.metrics.message_invalid();
                tracing::debug!(
                    endpoint = %self.config.name,
                    peer = %peer,
                    error = %failure,
                    "invalid message"
                );
                TransportEvent::Invalid(InvalidMessageEvent::new(
                    failure.partial,
                    peer,
                    local,
                    failure.error.to_string(),
                ))
            }
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn scheme(&self) -> &'static str {
        "udp"
    }

    async fn start(&self, events: mpsc::Sender<TransportEvent>) -> Result<()> {
        if self.lifecycle.is_stopped() {
            return Ok(());
        }

        let addr = self.resolve_bind_address().await?;
        let socket = self.bind_socket(addr).map_err(|e| TransportError::Bind {
            address: addr.to_string(),
            source: e,
        })?;
        let local_addr = socket.local_addr()?;
        self.lifecycle.started(local_addr);

        tracing::info!(
            endpoint = %self.config.name,
            transport = "udp",
            address = %local_addr,
            max_message_size = self.config.max_message_size,
            "listening"
        );

        let cancel = self.lifecycle.token();
        let mut buf = vec![0u8; receive_buffer_size(self.config.max_message_size)];

        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = socket.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, peer)) => {
                    self.metrics.bytes_read(len as u64);
                    let event = self.event_for(&buf[..len], peer, local_addr);
                    if events.send(event).await.is_err() {
                        tracing::debug!(
                            endpoint = %self.config.name,
                            "event channel closed, stopping receive loop"
                        );
                        break;
                    }
                }
                Err(e) => {
                    self.metrics.error();
                    tracing::debug!(
                        endpoint = %self.config.name,
                        error = %e,
                        "UDP receive error"
                    );
                }
            }
        }

        self.lifecycle.finished();
        tracing::info!(
            endpoint = %self.config.name,
            transport = "udp",
            "listener stopped"
        );
        Ok(())
    }

    fn stop(&self) {
        self.lifecycle.stop();
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    async fn forward(&self, target: &Url, raw: Bytes) -> Result<()> {
        send_datagram(target, raw).await
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.local_addr()
    }

    fn metrics(&self) -> TransportMetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// One byte past the largest datagram worth accepting
pub(crate) fn receive_buffer_size(max_message_size: usize) -> usize {
    max_message_size.min(MAX_DATAGRAM_SIZE) + 1
}

/// Send `raw` as one datagram from an ephemeral socket
async fn send_datagram(target: &Url, raw: Bytes) -> Result<()> {
    let address = socket_address(target)?;

    within(Some(DEFAULT_FORWARD_TIMEOUT), async {
        let remote = lookup_host(&address).await?.next().ok_or_else(|| {
            TransportError::invalid_address(target.as_str(), "no address resolved")
        })?;
        let local: SocketAddr = if remote.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(local).await?;
        socket.send_to(&raw, remote).await?;
        Ok(())
    })
    .await
}

/// Factory for `udp` endpoints and targets
#[derive(Debug, Clone, Default)]
pub struct UdpFactory;

#[async_trait]
impl TransportFactory for UdpFactory {
    fn scheme(&self) -> &'static str {
        "udp"
    }

    fn create(&self, config: Arc<EndpointConfig>) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(UdpTransport::new(config)))
    }

    async fn forward(&self, target: &Url, raw: Bytes) -> Result<()> {
        send_datagram(target, raw).await
    }
}

#[cfg(test)]
#[path = "udp_test.rs"]
mod udp_test;
