//! Protocol error types
//!
//! Errors raised while reassembling frames or decoding syslog headers.

use thiserror::Error;

/// Errors that can occur while reassembling frames from a byte stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// Declared or buffered frame exceeds the configured maximum
    #[error("frame size {size} exceeds limit {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    /// Octet-counting prefix could not be parsed
    #[error("invalid length prefix: {0}")]
    InvalidLengthPrefix(String),
}

impl FramingError {
    /// Create a frame too large error
    #[inline]
    pub fn too_large(size: usize, limit: usize) -> Self {
        Self::FrameTooLarge { size, limit }
    }
}

/// Errors that can occur while decoding a syslog header
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Frame contained no text
    #[error("empty message")]
    Empty,

    /// Frame does not start with `<PRI>`
    #[error("missing priority")]
    MissingPriority,

    /// PRI is not a number in 0..=191
    #[error("invalid priority: {0}")]
    InvalidPriority(String),

    /// A required header field is absent
    #[error("missing header field: {0}")]
    MissingField(&'static str),

    /// A header field is present but malformed
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    /// Structured data block is not terminated
    #[error("unterminated structured data")]
    UnterminatedStructuredData,

    /// Payload bytes are not valid UTF-8
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    /// Frame was rejected by the framer before decoding
    #[error("framing fault: {0}")]
    Framing(#[from] FramingError),
}

impl DecodeError {
    /// Create an invalid field error
    #[inline]
    pub fn invalid_field(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            value: value.into(),
        }
    }
}
