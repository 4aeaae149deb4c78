//! Raw syslog message types
//!
//! `RawMessage` is the unit every transport produces and every action consumes.
//! It is created exactly once per framed unit and never mutated afterwards.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use uuid::Uuid;

/// Correlation identifier for one connection (streaming transports) or one
/// datagram/request (UDP, HTTP)
///
/// Always a v4 UUID, so it can never be empty.
///
/// # Example
///
/// ```
/// use atna_protocol::SessionId;
///
/// let session = SessionId::new();
/// assert_eq!(session.to_string().len(), 36);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh session ID
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    #[inline]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// One decoded syslog message
///
/// Header fields use empty strings for RFC 5424 nil values (`-`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    facility: u8,
    severity: u8,
    version: u32,
    sent_at: Option<DateTime<FixedOffset>>,
    hostname: String,
    process_name: String,
    process_id: String,
    message_type: String,
    structured_data: Option<String>,
    session_id: SessionId,
    body: String,
    original: String,
}

impl RawMessage {
    /// Start building a message for the given session
    pub fn builder(session_id: SessionId) -> RawMessageBuilder {
        RawMessageBuilder::new(session_id)
    }

    /// Syslog facility (PRI >> 3)
    #[inline]
    pub fn facility(&self) -> u8 {
        self.facility
    }

    /// Syslog severity (PRI & 7)
    #[inline]
    pub fn severity(&self) -> u8 {
        self.severity
    }

    /// Protocol version (1 for RFC 5424, 0 for BSD syslog or synthetic headers)
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Timestamp claimed by the sender (RFC 5424 only)
    #[inline]
    pub fn sent_at(&self) -> Option<&DateTime<FixedOffset>> {
        self.sent_at.as_ref()
    }

    #[inline]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// APP-NAME (RFC 5424) or TAG (RFC 3164)
    #[inline]
    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    #[inline]
    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Format tag (RFC 5424 MSGID), e.g. `IHE+RFC-3881` or `DICOM+RFC3881`
    #[inline]
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Raw structured data element text, if any
    #[inline]
    pub fn structured_data(&self) -> Option<&str> {
        self.structured_data.as_deref()
    }

    #[inline]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Decoded payload (BOM stripped)
    #[inline]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Unmodified frame text as received
    #[inline]
    pub fn original(&self) -> &str {
        &self.original
    }
}

/// Builder for `RawMessage`
///
/// Every field except the session ID is optional and defaults to empty/zero.
#[derive(Debug, Clone)]
pub struct RawMessageBuilder {
    message: RawMessage,
}

impl RawMessageBuilder {
    /// Create a builder bound to a session
    pub fn new(session_id: SessionId) -> Self {
        Self {
            message: RawMessage {
                facility: 0,
                severity: 0,
                version: 0,
                sent_at: None,
                hostname: String::new(),
                process_name: String::new(),
                process_id: String::new(),
                message_type: String::new(),
                structured_data: None,
                session_id,
                body: String::new(),
                original: String::new(),
            },
        }
    }

    #[must_use]
    pub fn facility(mut self, facility: u8) -> Self {
        self.message.facility = facility;
        self
    }

    #[must_use]
    pub fn severity(mut self, severity: u8) -> Self {
        self.message.severity = severity;
        self
    }

    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.message.version = version;
        self
    }

    #[must_use]
    pub fn sent_at(mut self, sent_at: DateTime<FixedOffset>) -> Self {
        self.message.sent_at = Some(sent_at);
        self
    }

    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.message.hostname = hostname.into();
        self
    }

    #[must_use]
    pub fn process_name(mut self, process_name: impl Into<String>) -> Self {
        self.message.process_name = process_name.into();
        self
    }

    #[must_use]
    pub fn process_id(mut self, process_id: impl Into<String>) -> Self {
        self.message.process_id = process_id.into();
        self
    }

    #[must_use]
    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message.message_type = message_type.into();
        self
    }

    #[must_use]
    pub fn structured_data(mut self, structured_data: impl Into<String>) -> Self {
        self.message.structured_data = Some(structured_data.into());
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.message.body = body.into();
        self
    }

    #[must_use]
    pub fn original(mut self, original: impl Into<String>) -> Self {
        self.message.original = original.into();
        self
    }

    /// Finish building
    pub fn build(self) -> RawMessage {
        self.message
    }
}
