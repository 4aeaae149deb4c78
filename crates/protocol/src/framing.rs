//! Stream frame reassembly
//!
//! Streaming transports deliver arbitrary chunks. `FrameDecoder` accumulates
//! them and yields whole frames using two conventions:
//!
//! 1. Octet counting: `<digits> SP <n bytes>` (RFC 6587 section 3.4.1)
//! 2. Newline delimiting: text terminated by `\n`
//!
//! Octet counting wins whenever the buffer starts with a digit run followed by
//! a space and holds the whole counted frame. A counted frame that is still
//! incomplete waits for more bytes unless the buffer already holds a newline,
//! in which case the newline rule applies.

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};

use crate::error::FramingError;

/// Longest accepted decimal length prefix
const MAX_PREFIX_DIGITS: usize = 20;

/// Incremental frame decoder for one connection
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    /// Lines already split off by the newline rule, not yet handed out
    pending: VecDeque<Bytes>,
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Create a decoder that rejects frames larger than `max_frame_size`
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_frame_size.min(8192)),
            pending: VecDeque::new(),
            max_frame_size,
        }
    }

    /// Append freshly read bytes
    #[inline]
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet framed
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Maximum frame size this decoder enforces
    #[inline]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Extract the next complete frame
    ///
    /// Returns `Ok(None)` when more input is needed. An error means the stream
    /// can no longer be framed and the connection should be aborted.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, FramingError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            if self.buf.is_empty() {
                return Ok(None);
            }

            match self.octet_counted()? {
                Prefix::Frame(frame) => return Ok(Some(frame)),
                Prefix::Incomplete if !self.buf.contains(&b'\n') => return Ok(None),
                Prefix::Incomplete | Prefix::Absent => {}
            }

            if !self.split_lines()? {
                if self.buf.len() > self.max_frame_size {
                    return Err(FramingError::too_large(self.buf.len(), self.max_frame_size));
                }
                return Ok(None);
            }
        }
    }

    /// Take whatever is left in the buffer for a best-effort final frame
    ///
    /// Leading and trailing whitespace is trimmed and the result is truncated
    /// to the maximum frame size. Returns `None` if nothing meaningful remains.
    pub fn take_remaining(&mut self) -> Option<Bytes> {
        let mut rest = self.buf.split().freeze();
        let start = rest
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(rest.len());
        rest.advance(start);
        let end = rest
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(0, |p| p + 1);
        rest.truncate(end.min(self.max_frame_size));

        if rest.is_empty() { None } else { Some(rest) }
    }

    /// Try the octet counting rule at the head of the buffer
    fn octet_counted(&mut self) -> Result<Prefix, FramingError> {
        let digits = self.buf.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return Ok(Prefix::Absent);
        }
        if digits > MAX_PREFIX_DIGITS {
            let shown = String::from_utf8_lossy(&self.buf[..digits]).into_owned();
            return Err(FramingError::InvalidLengthPrefix(shown));
        }
        if digits == self.buf.len() {
            // Could still become "<len> ", wait
            return Ok(Prefix::Incomplete);
        }
        if self.buf[digits] != b' ' {
            return Ok(Prefix::Absent);
        }

        // ASCII digits only, so utf8 conversion cannot fail
        let text = std::str::from_utf8(&self.buf[..digits])
            .map_err(|e| FramingError::InvalidLengthPrefix(e.to_string()))?;
        let len: usize = text
            .parse()
            .map_err(|_| FramingError::InvalidLengthPrefix(text.to_string()))?;

        if len > self.max_frame_size {
            return Err(FramingError::too_large(len, self.max_frame_size));
        }

        let header = digits + 1;
        if self.buf.len() - header < len {
            return Ok(Prefix::Incomplete);
        }

        self.buf.advance(header);
        Ok(Prefix::Frame(self.buf.split_to(len).freeze()))
    }

    /// Apply the newline rule; returns false if the buffer has no `\n`
    fn split_lines(&mut self) -> Result<bool, FramingError> {
        let Some(last) = self.buf.iter().rposition(|b| *b == b'\n') else {
            return Ok(false);
        };

        let chunk = self.buf.split_to(last + 1).freeze();
        let mut start = 0;
        for (i, b) in chunk.iter().enumerate() {
            if *b != b'\n' {
                continue;
            }
            let mut end = i;
            if end > start && chunk[end - 1] == b'\r' {
                end -= 1;
            }
            if end > start {
                if end - start > self.max_frame_size {
                    self.pending.clear();
                    return Err(FramingError::too_large(end - start, self.max_frame_size));
                }
                self.pending.push_back(chunk.slice(start..end));
            }
            start = i + 1;
        }
        Ok(true)
    }
}

enum Prefix {
    Frame(Bytes),
    Incomplete,
    Absent,
}

#[cfg(test)]
#[path = "framing_test.rs"]
mod framing_test;
