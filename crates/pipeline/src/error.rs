//! Pipeline error types
//!
//! Errors raised while building or starting an endpoint listener.

use atna_actions::ActionError;
use atna_transport::TransportError;
use thiserror::Error;

use crate::listener::ListenerState;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transport could not be created
    #[error("endpoint '{endpoint}': {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: TransportError,
    },

    /// Action chain could not be built
    #[error("endpoint '{endpoint}': {source}")]
    Action {
        endpoint: String,
        #[source]
        source: ActionError,
    },

    /// `start` called on a listener that is not freshly created
    #[error("endpoint '{endpoint}' cannot start from state {state}")]
    InvalidState {
        endpoint: String,
        state: ListenerState,
    },

    /// `start` called outside a tokio runtime
    #[error("endpoint '{0}' must be started inside a tokio runtime")]
    NoRuntime(String),
}

impl PipelineError {
    pub fn transport(endpoint: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            source,
        }
    }

    pub fn action(endpoint: impl Into<String>, source: ActionError) -> Self {
        Self::Action {
            endpoint: endpoint.into(),
            source,
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::transport("audit", TransportError::UnknownProtocol("ftp".into()));
        assert!(err.to_string().starts_with("endpoint 'audit': "));
        assert!(err.to_string().contains("ftp"));

        let err = PipelineError::action("audit", ActionError::config("log_path missing"));
        assert!(err.to_string().contains("log_path missing"));

        let err = PipelineError::InvalidState {
            endpoint: "audit".into(),
            state: ListenerState::Running,
        };
        assert_eq!(err.to_string(), "endpoint 'audit' cannot start from state running");

        let err = PipelineError::NoRuntime("audit".into());
        assert!(err.to_string().contains("tokio runtime"));
    }
}
