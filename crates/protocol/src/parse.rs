//! Semantic parse results
//!
//! The audit decoder reports its verdict on a `RawMessage` through
//! `ParseResult`. The store action uses the outcome to decide whether to
//! persist, alert, or fail.

use std::fmt;

use crate::message::RawMessage;

/// Verdict of the audit decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Message is a well-formed audit record
    Accepted,
    /// Message was understood but is not an acceptable audit record
    Rejected,
    /// Decoder failed to process the message
    Error,
}

impl fmt::Display for ParseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Severity of a single parse detail
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DetailPriority {
    Information,
    Warning,
    Error,
}

/// One diagnostic produced while decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDetail {
    pub priority: DetailPriority,
    pub text: String,
    /// Underlying error description, if the detail came from one
    pub source: Option<String>,
}

impl ParseDetail {
    pub fn new(priority: DetailPriority, text: impl Into<String>) -> Self {
        Self {
            priority,
            text: text.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Result of decoding one message
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub outcome: ParseOutcome,
    pub message: Option<RawMessage>,
    pub details: Vec<ParseDetail>,
}

impl ParseResult {
    pub fn accepted(message: RawMessage) -> Self {
        Self {
            outcome: ParseOutcome::Accepted,
            message: Some(message),
            details: Vec::new(),
        }
    }

    pub fn rejected(message: RawMessage, reason: impl Into<String>) -> Self {
        Self {
            outcome: ParseOutcome::Rejected,
            message: Some(message),
            details: vec![ParseDetail::new(DetailPriority::Warning, reason)],
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            outcome: ParseOutcome::Error,
            message: None,
            details: vec![ParseDetail::new(DetailPriority::Error, reason)],
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: ParseDetail) -> Self {
        self.details.push(detail);
        self
    }

    #[inline]
    pub fn is_accepted(&self) -> bool {
        self.outcome == ParseOutcome::Accepted
    }

    /// Highest priority among the details, if any
    pub fn worst_priority(&self) -> Option<DetailPriority> {
        self.details.iter().map(|d| d.priority).max()
    }

    /// Detail texts joined with `; `
    pub fn summary(&self) -> String {
        self.details
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
