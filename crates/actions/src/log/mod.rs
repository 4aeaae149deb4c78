//! Log Action - Human-readable event log
//!
//! Appends one line per event to the endpoint's `log_path`.
//!
//! # Output Format
//!
//! ```text
//! [2026-01-15T10:30:45.123Z] [MESSAGE] endpoint=tls-in peer=10.0.0.7:51234 session_id=... facility=10 severity=5 hostname=pacs-1 process=archive msg_type=IHE+RFC-3881 thumbprint=- body=<AuditMessage>...
//! [2026-01-15T10:30:46.001Z] [INVALID] endpoint=tls-in peer=10.0.0.7:51234 session_id=... fault=missing priority body=garbage
//! [2026-01-15T10:30:47.500Z] [SECURITY] endpoint=tls-in peer=10.0.0.9:40022 reason=untrusted certificate
//! ```
//!
//! Newlines and control characters in the body are escaped so each event
//! stays on one line.
//!
//! # Shared files
//!
//! Several endpoints may name the same file. `LogFiles` hands every action
//! the same handle per path, and each line is written under that handle's
//! async mutex, so lines never interleave.

use std::collections::HashMap;
use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use atna_protocol::{
    InvalidMessageEvent, MessageEvent, PeerCertificate, RawMessage, SecurityAlert,
};
use atna_transport::EndpointConfig;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::registry::{ActionDeps, ActionFactory};
use crate::{ActionContext, ActionError, ActionFuture, ActionResult, SyslogAction};

#[cfg(test)]
#[path = "log_test.rs"]
mod tests;

// =============================================================================
// Shared file handles
// =============================================================================

/// One append-only log file, opened on first write
#[derive(Debug)]
pub struct LogFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl LogFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `line` as a single write
    pub async fn append(&self, line: &str) -> std::io::Result<()> {
        let mut guard = self.file.lock().await;

        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *guard = Some(file);
        }

        if let Some(file) = guard.as_mut() {
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
        }
        Ok(())
    }
}

/// Open log files keyed by path
#[derive(Debug, Default)]
pub struct LogFiles {
    files: parking_lot::Mutex<HashMap<PathBuf, Arc<LogFile>>>,
}

impl LogFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `path`, shared with every other caller using the same path
    pub fn handle(&self, path: &Path) -> Arc<LogFile> {
        let mut files = self.files.lock();
        Arc::clone(
            files
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(LogFile::new(path.to_path_buf()))),
        )
    }

    /// Number of distinct paths handed out
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }
}

// =============================================================================
// Action
// =============================================================================

/// Writes every event to a text file
pub struct LogAction {
    file: Arc<LogFile>,
}

impl LogAction {
    pub fn new(file: Arc<LogFile>) -> Self {
        Self { file }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    async fn write(&self, line: String) -> ActionResult<()> {
        self.file.append(&line).await.map_err(ActionError::from)
    }
}

impl SyslogAction for LogAction {
    fn name(&self) -> &'static str {
        "log"
    }

    fn handle_message<'a>(
        &'a self,
        ctx: &'a ActionContext,
        event: &'a MessageEvent,
    ) -> ActionFuture<'a> {
        Box::pin(self.write(format_message(ctx, event)))
    }

    fn handle_invalid<'a>(
        &'a self,
        ctx: &'a ActionContext,
        event: &'a InvalidMessageEvent,
    ) -> ActionFuture<'a> {
        Box::pin(self.write(format_invalid(ctx, event)))
    }

    fn handle_security_alert<'a>(
        &'a self,
        ctx: &'a ActionContext,
        alert: &'a SecurityAlert,
    ) -> ActionFuture<'a> {
        Box::pin(self.write(format_security(ctx, alert)))
    }
}

/// Factory for `log`; requires `log_path`
pub(crate) struct LogFactory;

impl ActionFactory for LogFactory {
    fn create(
        &self,
        endpoint: &EndpointConfig,
        deps: &ActionDeps,
    ) -> ActionResult<Box<dyn SyslogAction>> {
        let path = endpoint.log_path.as_deref().ok_or_else(|| {
            ActionError::config(format!(
                "endpoint '{}': log action requires log_path",
                endpoint.name
            ))
        })?;

        Ok(Box::new(LogAction::new(deps.log_files.handle(path))))
    }
}

// =============================================================================
// Line formatting
// =============================================================================

fn format_message(ctx: &ActionContext, event: &MessageEvent) -> String {
    let mut line = header(event.timestamp, "MESSAGE", ctx, event);
    append_message_fields(&mut line, &event.message);
    append_thumbprint(&mut line, event.peer_certificate.as_ref());
    line.push_str(" body=");
    append_escaped(&mut line, event.message.body());
    line.push('\n');
    line
}

fn format_invalid(ctx: &ActionContext, event: &InvalidMessageEvent) -> String {
    let mut line = header(event.timestamp, "INVALID", ctx, event);
    let _ = write!(line, " session_id={}", event.partial.session_id());
    append_thumbprint(&mut line, event.peer_certificate.as_ref());
    line.push_str(" fault=");
    append_escaped(&mut line, &event.fault);
    line.push_str(" body=");
    append_escaped(&mut line, event.partial.original());
    line.push('\n');
    line
}

fn format_security(ctx: &ActionContext, alert: &SecurityAlert) -> String {
    let mut line = header(alert.timestamp, "SECURITY", ctx, alert);
    let _ = write!(line, " receiver={}", alert.receiver);
    line.push_str(" reason=");
    append_escaped(&mut line, &alert.reason);
    line.push('\n');
    line
}

/// Anything with a remote peer
trait Peer {
    fn peer(&self) -> std::net::SocketAddr;
}

impl Peer for MessageEvent {
    fn peer(&self) -> std::net::SocketAddr {
        self.solicitor
    }
}

impl Peer for InvalidMessageEvent {
    fn peer(&self) -> std::net::SocketAddr {
        self.solicitor
    }
}

impl Peer for SecurityAlert {
    fn peer(&self) -> std::net::SocketAddr {
        self.solicitor
    }
}

fn header(at: DateTime<Utc>, kind: &str, ctx: &ActionContext, event: &impl Peer) -> String {
    let mut line = String::with_capacity(256);
    let _ = write!(
        line,
        "[{}] [{}] endpoint={} peer={}",
        at.to_rfc3339_opts(SecondsFormat::Millis, true),
        kind,
        ctx.endpoint,
        event.peer()
    );
    line
}

fn append_message_fields(line: &mut String, msg: &RawMessage) {
    let _ = write!(
        line,
        " session_id={} facility={} severity={} hostname={} process={} msg_type={}",
        msg.session_id(),
        msg.facility(),
        msg.severity(),
        or_nil(msg.hostname()),
        or_nil(msg.process_name()),
        or_nil(msg.message_type()),
    );
}

fn append_thumbprint(line: &mut String, cert: Option<&PeerCertificate>) {
    let thumbprint = cert.map_or("-", |c| c.thumbprint.as_str());
    let _ = write!(line, " thumbprint={thumbprint}");
}

#[inline]
fn or_nil(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

/// Escape newlines and control characters for single-line output
fn append_escaped(buf: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            '\\' => buf.push_str("\\\\"),
            c if c.is_control() => {
                let _ = write!(buf, "\\x{:02x}", c as u32);
            }
            c => buf.push(c),
        }
    }
}
