//! Audit decoding
//!
//! The store action only persists messages an `AuditDecoder` accepts. The
//! built-in `AuditMessageDecoder` checks the envelope of an RFC 3881 /
//! DICOM audit message without mapping its fields; a full payload model
//! plugs in through the same trait.

use atna_protocol::{DetailPriority, ParseDetail, ParseResult, RawMessage};

/// Message types (RFC 5424 MSGID) that carry audit messages
pub const AUDIT_MESSAGE_TYPES: &[&str] = &[
    "IHE+RFC-3881",
    "IHE+RFC3881",
    "DICOM+RFC3881",
    "DICOM+RFC-3881",
];

/// Turns a received message into a parse verdict
pub trait AuditDecoder: Send + Sync {
    fn decode(&self, message: &RawMessage) -> ParseResult;
}

/// Structural check of an `<AuditMessage>` document
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditMessageDecoder;

impl AuditMessageDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl AuditDecoder for AuditMessageDecoder {
    fn decode(&self, message: &RawMessage) -> ParseResult {
        let body = message.body().trim();
        if body.is_empty() {
            return ParseResult::error("empty audit payload");
        }

        let document = skip_prolog(body);
        if !document.starts_with('<') {
            return ParseResult::rejected(message.clone(), "payload is not XML");
        }

        let root = root_element(document);
        if local_name(root) != "AuditMessage" {
            return ParseResult::rejected(
                message.clone(),
                format!("unexpected root element '{root}'"),
            );
        }

        let closing = format!("</{root}>");
        let self_closed = document.find('>').is_some_and(|end| document[..end].ends_with('/'));
        if !self_closed && !document.ends_with(&closing) {
            return ParseResult::rejected(message.clone(), "unterminated AuditMessage");
        }

        if !contains_element(document, "EventIdentification") {
            return ParseResult::rejected(message.clone(), "missing EventIdentification");
        }

        let mut result = ParseResult::accepted(message.clone());

        for element in ["ActiveParticipant", "AuditSourceIdentification"] {
            if !contains_element(document, element) {
                result = result.with_detail(ParseDetail::new(
                    DetailPriority::Warning,
                    format!("missing {element}"),
                ));
            }
        }

        let msg_type = message.message_type();
        if !msg_type.is_empty() && !AUDIT_MESSAGE_TYPES.contains(&msg_type) {
            result = result.with_detail(ParseDetail::new(
                DetailPriority::Information,
                format!("unexpected message type '{msg_type}'"),
            ));
        }

        result
    }
}

/// Skip an XML declaration and leading comments
fn skip_prolog(mut text: &str) -> &str {
    loop {
        text = text.trim_start();
        let end = if text.starts_with("<?") {
            text.find("?>").map(|i| i + 2)
        } else if text.starts_with("<!--") {
            text.find("-->").map(|i| i + 3)
        } else {
            return text;
        };

        match end {
            Some(end) => text = &text[end..],
            None => return text,
        }
    }
}

/// Name of the first element (`text` starts with `<`)
fn root_element(text: &str) -> &str {
    let rest = &text[1..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    &rest[..end]
}

fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// Whether an element named `name` (any prefix) opens anywhere in `text`
fn contains_element(text: &str, name: &str) -> bool {
    text.match_indices(name).any(|(i, _)| {
        let ends_name = match text[i + name.len()..].chars().next() {
            Some(c) => c.is_whitespace() || c == '>' || c == '/',
            None => false,
        };
        ends_name && opens_tag(&text[..i])
    })
}

/// Whether `before` ends with `<` or `<prefix:`
fn opens_tag(before: &str) -> bool {
    match before.rfind('<') {
        Some(lt) => {
            let prefix = &before[lt + 1..];
            prefix.is_empty() || (prefix.ends_with(':') && !prefix.contains(char::is_whitespace))
        }
        None => false,
    }
}
