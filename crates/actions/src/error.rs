//! Action error types

use thiserror::Error;

use crate::store::AuditSinkError;

/// Errors raised by an action or while building one
#[derive(Debug, Error)]
pub enum ActionError {
    /// Action type not registered
    #[error("unknown action type '{name}', available: [{available}]")]
    UnknownAction { name: String, available: String },

    /// Invalid configuration for this action
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Audit payload could not be decoded
    #[error("audit decode failed: {0}")]
    Decode(String),

    /// Persistence failed
    #[error(transparent)]
    Sink(#[from] AuditSinkError),

    /// I/O error (log files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ActionError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

/// Result type for action operations
pub type ActionResult<T> = std::result::Result<T, ActionError>;
