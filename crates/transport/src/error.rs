//! Transport error types

use thiserror::Error;

/// Errors raised by transports, the registry and TLS setup
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to bind the listen address
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No factory registered for the scheme
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    /// Address URI cannot be used
    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Endpoint configuration is unusable
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Certificate or TLS setup failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// Operation exceeded its deadline
    #[error("operation timed out")]
    Timeout,

    /// Event channel receiver was dropped
    #[error("event channel closed")]
    ChannelClosed,

    /// HTTP server or client failure
    #[error("HTTP error: {0}")]
    Http(String),
}

impl TransportError {
    /// Create an invalid address error
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create a TLS error
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
