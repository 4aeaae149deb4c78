//! Transport events
//!
//! Every transport reports to its endpoint listener through `TransportEvent`.
//! Events carry provenance (who sent it, where it arrived, when) alongside the
//! decoded or salvaged message.

use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};

use crate::message::RawMessage;

/// Certificate presented by an authenticated TLS peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    /// DER-encoded end-entity certificate
    pub der: Vec<u8>,
    /// Uppercase hex SHA-256 of `der`
    pub thumbprint: String,
}

/// A successfully decoded message
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub message: RawMessage,
    /// Remote address that sent the message
    pub solicitor: SocketAddr,
    /// Local address the message arrived on
    pub receiver: SocketAddr,
    pub timestamp: DateTime<Utc>,
    /// Present only for TLS transports with a client certificate
    pub peer_certificate: Option<PeerCertificate>,
}

impl MessageEvent {
    /// Create an event stamped with the current time
    pub fn new(message: RawMessage, solicitor: SocketAddr, receiver: SocketAddr) -> Self {
        Self {
            message,
            solicitor,
            receiver,
            timestamp: Utc::now(),
            peer_certificate: None,
        }
    }

    #[must_use]
    pub fn with_peer_certificate(mut self, cert: Option<PeerCertificate>) -> Self {
        self.peer_certificate = cert;
        self
    }
}

/// A frame that could not be decoded (or a framing fault)
#[derive(Debug, Clone)]
pub struct InvalidMessageEvent {
    /// Whatever could be salvaged; `original` always holds the frame text
    pub partial: RawMessage,
    pub solicitor: SocketAddr,
    pub receiver: SocketAddr,
    pub timestamp: DateTime<Utc>,
    pub peer_certificate: Option<PeerCertificate>,
    /// Human readable fault description
    pub fault: String,
}

impl InvalidMessageEvent {
    /// Create an event stamped with the current time
    pub fn new(
        partial: RawMessage,
        solicitor: SocketAddr,
        receiver: SocketAddr,
        fault: impl Into<String>,
    ) -> Self {
        Self {
            partial,
            solicitor,
            receiver,
            timestamp: Utc::now(),
            peer_certificate: None,
            fault: fault.into(),
        }
    }

    #[must_use]
    pub fn with_peer_certificate(mut self, cert: Option<PeerCertificate>) -> Self {
        self.peer_certificate = cert;
        self
    }
}

/// A failed TLS handshake or peer authentication
#[derive(Debug, Clone)]
pub struct SecurityAlert {
    pub solicitor: SocketAddr,
    pub receiver: SocketAddr,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

impl SecurityAlert {
    /// Create an alert stamped with the current time
    pub fn new(solicitor: SocketAddr, receiver: SocketAddr, reason: impl Into<String>) -> Self {
        Self {
            solicitor,
            receiver,
            timestamp: Utc::now(),
            reason: reason.into(),
        }
    }
}

/// What a transport hands to its endpoint listener
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Message(MessageEvent),
    Invalid(InvalidMessageEvent),
    SecurityAlert(SecurityAlert),
}

impl TransportEvent {
    /// Remote address the event originated from
    pub fn solicitor(&self) -> SocketAddr {
        match self {
            Self::Message(e) => e.solicitor,
            Self::Invalid(e) => e.solicitor,
            Self::SecurityAlert(e) => e.solicitor,
        }
    }

    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Invalid(_) => "invalid",
            Self::SecurityAlert(_) => "security_alert",
        }
    }
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.kind(), self.solicitor())
    }
}
