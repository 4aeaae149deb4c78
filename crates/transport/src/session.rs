//! Per-connection session loop for streaming transports
//!
//! A `Session` owns one accepted stream. It reads into a `FrameDecoder`,
//! decodes every complete frame and reports the result over the event
//! channel. The session ends on EOF, on a read or session timeout, on a
//! framing fault, or on cancellation. Bytes still buffered at that point are
//! decoded as a best-effort final message, except after a framing fault where
//! they are reported as invalid.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use atna_protocol::{
    FrameDecoder, FramingError, InvalidMessageEvent, MessageEvent, PeerCertificate, RawMessage,
    SessionId, TransportEvent, decode_syslog,
};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::common::{TransportMetrics, is_connection_reset};
use crate::config::EndpointConfig;

/// Read chunk size
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Peer closed the connection
    Eof,
    /// No data within the per-read timeout
    ReadTimeout,
    /// Total session time exceeded
    SessionTimeout,
    /// Transport is stopping
    Cancelled,
    /// Stream could not be framed
    Fault,
    /// Read failed
    Io,
    /// Listener is gone
    ChannelClosed,
}

/// One streaming connection
pub struct Session {
    config: Arc<EndpointConfig>,
    events: mpsc::Sender<TransportEvent>,
    metrics: Arc<TransportMetrics>,
    cancel: CancellationToken,
    solicitor: SocketAddr,
    receiver: SocketAddr,
    session_id: SessionId,
    peer_certificate: Option<PeerCertificate>,
}

impl Session {
    pub fn new(
        config: Arc<EndpointConfig>,
        events: mpsc::Sender<TransportEvent>,
        metrics: Arc<TransportMetrics>,
        cancel: CancellationToken,
        solicitor: SocketAddr,
        receiver: SocketAddr,
    ) -> Self {
        Self {
            config,
            events,
            metrics,
            cancel,
            solicitor,
            receiver,
            session_id: SessionId::new(),
            peer_certificate: None,
        }
    }

    /// Attach the certificate the peer authenticated with
    #[must_use]
    pub fn with_peer_certificate(mut self, cert: Option<PeerCertificate>) -> Self {
        self.peer_certificate = cert;
        self
    }

    #[inline]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Drive the session until the stream ends
    pub async fn run<S>(self, mut stream: S) -> SessionEnd
    where
        S: AsyncRead + Unpin,
    {
        let started = Instant::now();
        let mut decoder = FrameDecoder::new(self.config.max_message_size);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        tracing::trace!(
            endpoint = %self.config.name,
            peer = %self.solicitor,
            session_id = %self.session_id,
            "session started"
        );

        let end = loop {
            let Some(wait) = self.next_wait(started) else {
                break SessionEnd::SessionTimeout;
            };

            let read = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break SessionEnd::Cancelled,

                read = async {
                    match wait {
                        Some(wait) => tokio::time::timeout(wait, stream.read(&mut buf)).await,
                        None => Ok(stream.read(&mut buf).await),
                    }
                } => read,
            };

            match read {
                Ok(Ok(0)) => break SessionEnd::Eof,
                Ok(Ok(n)) => {
                    self.metrics.bytes_read(n as u64);
                    decoder.extend(&buf[..n]);
                    match self.drain(&mut decoder).await {
                        Ok(true) => {}
                        Ok(false) => break SessionEnd::ChannelClosed,
                        Err(e) => {
                            self.report_fault(&mut decoder, e).await;
                            break SessionEnd::Fault;
                        }
                    }
                }
                Ok(Err(e)) => {
                    if !is_connection_reset(&e) {
                        self.metrics.error();
                        tracing::debug!(
                            endpoint = %self.config.name,
                            peer = %self.solicitor,
                            error = %e,
                            "session read error"
                        );
                    }
                    break SessionEnd::Io;
                }
                Err(_) => {
                    let session_expired = self
                        .config
                        .session_timeout()
                        .is_some_and(|limit| started.elapsed() >= limit);
                    break if session_expired {
                        SessionEnd::SessionTimeout
                    } else {
                        SessionEnd::ReadTimeout
                    };
                }
            }
        };

        if !matches!(end, SessionEnd::Fault | SessionEnd::ChannelClosed)
            && let Some(rest) = decoder.take_remaining()
        {
            let _ = self.emit(rest).await;
        }

        match end {
            SessionEnd::ReadTimeout | SessionEnd::SessionTimeout => tracing::debug!(
                endpoint = %self.config.name,
                peer = %self.solicitor,
                reason = ?end,
                "session timed out"
            ),
            _ => tracing::trace!(
                endpoint = %self.config.name,
                peer = %self.solicitor,
                session_id = %self.session_id,
                reason = ?end,
                "session ended"
            ),
        }

        end
    }

    /// How long the next read may wait
    ///
    /// `None` when the session deadline has passed, `Some(None)` when there is
    /// no limit at all.
    fn next_wait(&self, started: Instant) -> Option<Option<Duration>> {
        let remaining = match self.config.session_timeout() {
            Some(limit) => {
                let remaining = limit.checked_sub(started.elapsed())?;
                if remaining.is_zero() {
                    return None;
                }
                Some(remaining)
            }
            None => None,
        };

        Some(match (self.config.read_timeout(), remaining) {
            (Some(read), Some(remaining)) => Some(read.min(remaining)),
            (read, remaining) => read.or(remaining),
        })
    }

    /// Emit every complete frame; `Ok(false)` means the channel is closed
    async fn drain(&self, decoder: &mut FrameDecoder) -> Result<bool, FramingError> {
        while let Some(frame) = decoder.next_frame()? {
            if !self.emit(frame).await {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Decode one frame and send the resulting event
    async fn emit(&self, frame: Bytes) -> bool {
        let event = match decode_syslog(&frame, self.session_id) {
            Ok(message) => {
                self.metrics.message_received();
                tracing::trace!(
                    endpoint = %self.config.name,
                    peer = %self.solicitor,
                    bytes = frame.len(),
                    "message received"
                );
                TransportEvent::Message(
                    MessageEvent::new(message, self.solicitor, self.receiver)
                        .with_peer_certificate(self.peer_certificate.clone()),
                )
            }
            Err(failure) => {
                self.metrics.message_invalid();
                tracing::debug!(
                    endpoint = %self.config.name,
                    peer = %self.solicitor,
                    error = %failure,
                    "invalid message"
                );
                TransportEvent::Invalid(
                    InvalidMessageEvent::new(
                        failure.partial,
                        self.solicitor,
                        self.receiver,
                        failure.error.to_string(),
                    )
                    .with_peer_certificate(self.peer_certificate.clone()),
                )
            }
        };
        self.events.send(event).await.is_ok()
    }

    /// Report a framing fault with the buffered prefix
    async fn report_fault(&self, decoder: &mut FrameDecoder, error: FramingError) {
        self.metrics.message_invalid();
        tracing::debug!(
            endpoint = %self.config.name,
            peer = %self.solicitor,
            error = %error,
            "framing fault, closing connection"
        );

        let text = decoder
            .take_remaining()
            .map(|rest| String::from_utf8_lossy(&rest).into_owned())
            .unwrap_or_default();
        let partial = RawMessage::builder(self.session_id)
            .body(text.clone())
            .original(text)
            .build();
        let event = InvalidMessageEvent::new(
            partial,
            self.solicitor,
            self.receiver,
            error.to_string(),
        )
        .with_peer_certificate(self.peer_certificate.clone());

        let _ = self.events.send(TransportEvent::Invalid(event)).await;
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
