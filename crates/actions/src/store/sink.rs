//! Audit sink - where stored records and alerts go
//!
//! Durable persistence lives behind `AuditSink`. The collector ships with
//! `TracingAuditSink`, which reports through the log; deployments with a
//! database provide their own implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use atna_protocol::{ParseDetail, RawMessage};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors reported by an audit sink
#[derive(Debug, Error)]
pub enum AuditSinkError {
    /// Backend cannot be reached
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    /// Backend refused the record
    #[error("audit record refused: {0}")]
    Refused(String),
}

/// Future returned by sink operations
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AuditSinkError>> + Send + 'a>>;

/// An accepted audit message with its provenance
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub endpoint: Arc<str>,
    pub message: RawMessage,
    pub solicitor: SocketAddr,
    pub receiver: SocketAddr,
    pub received_at: DateTime<Utc>,
    /// Thumbprint of the authenticated TLS peer
    pub peer_thumbprint: Option<String>,
    /// Non-fatal decoder diagnostics
    pub details: Vec<ParseDetail>,
}

/// Something an auditor should know about that is not a stored record
#[derive(Debug, Clone)]
pub enum AuditAlert {
    /// The decoder rejected a message
    Rejected {
        endpoint: Arc<str>,
        solicitor: SocketAddr,
        message: RawMessage,
        reason: String,
    },

    /// A frame could not be decoded as syslog
    Invalid {
        endpoint: Arc<str>,
        solicitor: SocketAddr,
        original: String,
        fault: String,
    },

    /// A peer failed TLS authentication
    Security {
        endpoint: Arc<str>,
        solicitor: SocketAddr,
        receiver: SocketAddr,
        reason: String,
    },
}

impl AuditAlert {
    /// Alert kind for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Invalid { .. } => "invalid",
            Self::Security { .. } => "security",
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Self::Rejected { endpoint, .. }
            | Self::Invalid { endpoint, .. }
            | Self::Security { endpoint, .. } => endpoint,
        }
    }

    pub fn solicitor(&self) -> SocketAddr {
        match self {
            Self::Rejected { solicitor, .. }
            | Self::Invalid { solicitor, .. }
            | Self::Security { solicitor, .. } => *solicitor,
        }
    }

    /// Why the alert was raised
    pub fn reason(&self) -> &str {
        match self {
            Self::Rejected { reason, .. } | Self::Security { reason, .. } => reason,
            Self::Invalid { fault, .. } => fault,
        }
    }
}

/// Receives accepted records and alerts from the store action
pub trait AuditSink: Send + Sync {
    fn store(&self, record: AuditRecord) -> SinkFuture<'_>;

    fn alert(&self, alert: AuditAlert) -> SinkFuture<'_>;
}

/// Sink that reports records and alerts through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn store(&self, record: AuditRecord) -> SinkFuture<'_> {
        tracing::info!(
            endpoint = %record.endpoint,
            peer = %record.solicitor,
            session_id = %record.message.session_id(),
            hostname = record.message.hostname(),
            msg_type = record.message.message_type(),
            thumbprint = record.peer_thumbprint.as_deref().unwrap_or("-"),
            details = record.details.len(),
            "audit record"
        );
        Box::pin(async { Ok(()) })
    }

    fn alert(&self, alert: AuditAlert) -> SinkFuture<'_> {
        tracing::warn!(
            endpoint = alert.endpoint(),
            peer = %alert.solicitor(),
            kind = alert.kind(),
            reason = alert.reason(),
            "audit alert"
        );
        Box::pin(async { Ok(()) })
    }
}
