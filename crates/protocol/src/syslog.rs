//! Syslog header decoding
//!
//! Turns one framed unit into a `RawMessage`. Two header grammars are
//! recognised:
//!
//! ```text
//! RFC 5424: <PRI>VERSION SP TIMESTAMP SP HOSTNAME SP APP-NAME SP PROCID SP MSGID SP SD [SP MSG]
//! RFC 3164: <PRI>Mmm dd hh:mm:ss SP HOSTNAME SP TAG[PID]: MSG
//! ```
//!
//! A frame that fails to decode still yields a partial message: the original
//! text is always kept and any header fields parsed before the fault are set.

use chrono::DateTime;
use thiserror::Error;

use crate::error::DecodeError;
use crate::message::{RawMessage, RawMessageBuilder, SessionId};
use crate::{MAX_PRIORITY, SYNTHETIC_FACILITY};

const NIL: &str = "-";
const BOM: char = '\u{FEFF}';
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Decode fault together with whatever could be salvaged
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct DecodeFailure {
    #[source]
    pub error: DecodeError,
    pub partial: RawMessage,
}

/// Decode a syslog frame
///
/// # Example
///
/// ```
/// use atna_protocol::{SessionId, decode_syslog};
///
/// let msg = decode_syslog(b"<85>1 - ehr01 audit 42 IHE+RFC-3881 - <AuditMessage/>", SessionId::new()).unwrap();
/// assert_eq!(msg.facility(), 10);
/// assert_eq!(msg.hostname(), "ehr01");
/// assert_eq!(msg.body(), "<AuditMessage/>");
/// ```
pub fn decode_syslog(frame: &[u8], session: SessionId) -> Result<RawMessage, DecodeFailure> {
    let builder = RawMessage::builder(session);

    let text = match std::str::from_utf8(frame) {
        Ok(text) => text,
        Err(_) => {
            let lossy = String::from_utf8_lossy(frame).into_owned();
            return Err(fail(
                builder.body(lossy.clone()).original(lossy),
                DecodeError::InvalidUtf8,
            ));
        }
    };

    let builder = builder.body(text).original(text);
    if text.trim().is_empty() {
        return Err(fail(builder, DecodeError::Empty));
    }

    let (pri, rest) = match parse_priority(text) {
        Ok(parsed) => parsed,
        Err(e) => return Err(fail(builder, e)),
    };
    let builder = builder.facility((pri >> 3) as u8).severity((pri & 7) as u8);

    match version_prefix(rest) {
        Some((version, header)) => decode_rfc5424(builder.version(version), header),
        None => Ok(decode_rfc3164(builder, rest)),
    }
}

/// Wrap a payload that carries no syslog header
///
/// Used for HTTP bodies: facility is fixed, the peer supplies the hostname.
pub fn decode_headerless(
    body: &[u8],
    hostname: &str,
    process_name: &str,
    session: SessionId,
) -> Result<RawMessage, DecodeFailure> {
    let builder = RawMessage::builder(session)
        .facility(SYNTHETIC_FACILITY)
        .hostname(hostname)
        .process_name(process_name)
        .process_id(NIL);

    let text = match std::str::from_utf8(body) {
        Ok(text) => text,
        Err(_) => {
            let lossy = String::from_utf8_lossy(body).into_owned();
            return Err(fail(
                builder.body(lossy.clone()).original(lossy),
                DecodeError::InvalidUtf8,
            ));
        }
    };

    let builder = builder
        .body(text.strip_prefix(BOM).unwrap_or(text))
        .original(text);
    if text.trim().is_empty() {
        return Err(fail(builder, DecodeError::Empty));
    }
    Ok(builder.build())
}

#[inline]
fn fail(builder: RawMessageBuilder, error: DecodeError) -> DecodeFailure {
    DecodeFailure {
        error,
        partial: builder.build(),
    }
}

/// Parse `<PRI>` and return the value plus the remaining text
fn parse_priority(text: &str) -> Result<(u16, &str), DecodeError> {
    let Some(after) = text.strip_prefix('<') else {
        return Err(DecodeError::MissingPriority);
    };
    let Some(close) = after.find('>') else {
        return Err(DecodeError::InvalidPriority(truncate(after, 8)));
    };

    let digits = &after[..close];
    if digits.is_empty() || digits.len() > 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::InvalidPriority(truncate(digits, 8)));
    }
    let pri: u16 = digits
        .parse()
        .map_err(|_| DecodeError::InvalidPriority(digits.to_string()))?;
    if pri > MAX_PRIORITY {
        return Err(DecodeError::InvalidPriority(digits.to_string()));
    }

    Ok((pri, &after[close + 1..]))
}

/// Detect an RFC 5424 VERSION field (1-2 digits, not starting with 0, then SP)
fn version_prefix(rest: &str) -> Option<(u32, &str)> {
    let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || digits > 2 || rest.starts_with('0') {
        return None;
    }
    let header = rest[digits..].strip_prefix(' ')?;
    let version = rest[..digits].parse().ok()?;
    Some((version, header))
}

/// Split off the next space-delimited token
fn next_token<'a>(
    rest: &'a str,
    field: &'static str,
) -> Result<(&'a str, &'a str), DecodeError> {
    if rest.is_empty() {
        return Err(DecodeError::MissingField(field));
    }
    match rest.find(' ') {
        Some(0) => Err(DecodeError::MissingField(field)),
        Some(pos) => Ok((&rest[..pos], &rest[pos + 1..])),
        None => Ok((rest, "")),
    }
}

#[inline]
fn nil_to_empty(value: &str) -> &str {
    if value == NIL { "" } else { value }
}

fn decode_rfc5424(builder: RawMessageBuilder, header: &str) -> Result<RawMessage, DecodeFailure> {
    let mut b = builder;

    let (timestamp, rest) = match next_token(header, "timestamp") {
        Ok(t) => t,
        Err(e) => return Err(fail(b, e)),
    };
    if timestamp != NIL {
        match DateTime::parse_from_rfc3339(timestamp) {
            Ok(ts) => b = b.sent_at(ts),
            Err(_) => return Err(fail(b, DecodeError::invalid_field("timestamp", timestamp))),
        }
    }

    let (hostname, rest) = match next_token(rest, "hostname") {
        Ok(t) => t,
        Err(e) => return Err(fail(b, e)),
    };
    b = b.hostname(nil_to_empty(hostname));

    let (app_name, rest) = match next_token(rest, "app-name") {
        Ok(t) => t,
        Err(e) => return Err(fail(b, e)),
    };
    b = b.process_name(nil_to_empty(app_name));

    let (proc_id, rest) = match next_token(rest, "procid") {
        Ok(t) => t,
        Err(e) => return Err(fail(b, e)),
    };
    b = b.process_id(nil_to_empty(proc_id));

    let (msg_id, rest) = match next_token(rest, "msgid") {
        Ok(t) => t,
        Err(e) => return Err(fail(b, e)),
    };
    b = b.message_type(nil_to_empty(msg_id));

    let (sd, rest) = match structured_data(rest) {
        Ok(parsed) => parsed,
        Err(e) => return Err(fail(b, e)),
    };
    if let Some(sd) = sd {
        b = b.structured_data(sd);
    }

    let msg = rest.strip_prefix(' ').unwrap_or(rest);
    let msg = msg.strip_prefix(BOM).unwrap_or(msg);
    Ok(b.body(msg).build())
}

/// Parse STRUCTURED-DATA: `-` or one or more `[...]` elements
fn structured_data(rest: &str) -> Result<(Option<&str>, &str), DecodeError> {
    if rest.is_empty() {
        return Err(DecodeError::MissingField("structured-data"));
    }
    if let Some(after) = rest.strip_prefix(NIL)
        && (after.is_empty() || after.starts_with(' '))
    {
        return Ok((None, after));
    }
    if !rest.starts_with('[') {
        return Err(DecodeError::invalid_field(
            "structured-data",
            truncate(rest, 32),
        ));
    }

    let bytes = rest.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() && bytes[pos] == b'[' {
        pos += 1;
        let mut closed = false;
        while pos < bytes.len() {
            match bytes[pos] {
                b'\\' => pos += 2,
                b']' => {
                    pos += 1;
                    closed = true;
                    break;
                }
                _ => pos += 1,
            }
        }
        if !closed {
            return Err(DecodeError::UnterminatedStructuredData);
        }
    }

    Ok((Some(&rest[..pos]), &rest[pos..]))
}

fn decode_rfc3164(builder: RawMessageBuilder, rest: &str) -> RawMessage {
    let Some(after_ts) = bsd_timestamp(rest) else {
        // No recognisable header, the whole remainder is the message
        return builder.body(rest).build();
    };

    let (hostname, rest) = match after_ts.find(' ') {
        Some(pos) => (&after_ts[..pos], &after_ts[pos + 1..]),
        None => (after_ts, ""),
    };
    let builder = builder.hostname(hostname);

    let tag_end = rest.find([':', '[', ' ']);
    let (builder, msg) = match tag_end.map(|pos| (pos, rest.as_bytes()[pos])) {
        Some((pos, b'[')) => {
            let tag = &rest[..pos];
            match rest[pos + 1..].find(']') {
                Some(close) => {
                    let pid = &rest[pos + 1..pos + 1 + close];
                    let after = &rest[pos + 2 + close..];
                    let after = after.strip_prefix(':').unwrap_or(after);
                    (builder.process_name(tag).process_id(pid), after)
                }
                None => (builder, rest),
            }
        }
        Some((pos, b':')) => (builder.process_name(&rest[..pos]), &rest[pos + 1..]),
        _ => (builder, rest),
    };

    let msg = msg.strip_prefix(' ').unwrap_or(msg);
    let msg = msg.strip_prefix(BOM).unwrap_or(msg);
    builder.body(msg).build()
}

/// Match `Mmm dd hh:mm:ss SP` and return the text after it
fn bsd_timestamp(rest: &str) -> Option<&str> {
    let bytes = rest.as_bytes();
    if bytes.len() < 16 || bytes[15] != b' ' {
        return None;
    }
    if !rest.get(..3).is_some_and(|m| MONTHS.contains(&m)) || bytes[3] != b' ' {
        return None;
    }
    let day_ok = (bytes[4] == b' ' || bytes[4].is_ascii_digit()) && bytes[5].is_ascii_digit();
    let time = &bytes[7..15];
    let time_ok = bytes[6] == b' '
        && time[2] == b':'
        && time[5] == b':'
        && [0, 1, 3, 4, 6, 7].iter().all(|&i| time[i].is_ascii_digit());

    if day_ok && time_ok {
        Some(&rest[16..])
    } else {
        None
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
#[path = "syslog_test.rs"]
mod syslog_test;
