//! ATNA Protocol - Core message types for the audit collector
//!
//! This crate provides the types that flow from transports to actions:
//! - `RawMessage` - One decoded syslog unit (header fields + body + original text)
//! - `SessionId` - Correlation identifier for one connection or datagram
//! - `TransportEvent` - What a transport hands to its endpoint listener
//! - `FrameDecoder` - Stream reassembly (octet counting and newline framing)
//! - `decode_syslog` - RFC 5424 / RFC 3164 header decoding
//! - `ParseResult` - Outcome of semantic audit decoding (produced by collaborators)
//!
//! # Design Principles
//!
//! - **Bytes in, text out**: framing works on `bytes::BytesMut`, decoding is lossy UTF-8
//! - **Immutable messages**: `RawMessage` is built once through `RawMessageBuilder`
//! - **Salvage on failure**: decode faults still carry a partial message

mod error;
mod event;
mod framing;
mod message;
mod parse;
mod syslog;

pub use error::{DecodeError, FramingError};
pub use event::{
    InvalidMessageEvent, MessageEvent, PeerCertificate, SecurityAlert, TransportEvent,
};
pub use framing::FrameDecoder;
pub use message::{RawMessage, RawMessageBuilder, SessionId};
pub use parse::{DetailPriority, ParseDetail, ParseOutcome, ParseResult};
pub use syslog::{DecodeFailure, decode_headerless, decode_syslog};

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

/// Result type for syslog decoding
pub type DecodeResult<T> = std::result::Result<T, DecodeFailure>;

/// Default maximum size of a single frame (64KB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Largest PRI value allowed by RFC 5424 (facility 23, severity 7)
pub const MAX_PRIORITY: u16 = 191;

/// Facility assigned to messages that carry no syslog header (HTTP bodies)
pub const SYNTHETIC_FACILITY: u8 = 1;
