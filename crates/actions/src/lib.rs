//! ATNA Actions - What happens to a received message
//!
//! An endpoint runs an ordered chain of actions for every event its
//! transport produces. Actions are configured by type name:
//!
//! - `log` - append one line per event to a file
//! - `store` - decode the audit payload and hand it to an `AuditSink`
//! - `forward` - re-send the original bytes to downstream collectors
//!
//! # Failure isolation
//!
//! `ActionChain::dispatch` runs every action in order. An action that
//! returns an error or panics is logged and counted; the remaining actions
//! still run, and the next event is dispatched as usual.
//!
//! # Example
//!
//! ```ignore
//! struct CountAction(AtomicU64);
//!
//! impl SyslogAction for CountAction {
//!     fn name(&self) -> &'static str {
//!         "count"
//!     }
//!
//!     fn handle_message<'a>(
//!         &'a self,
//!         _ctx: &'a ActionContext,
//!         _event: &'a MessageEvent,
//!     ) -> ActionFuture<'a> {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!         Box::pin(async { Ok(()) })
//!     }
//!
//!     fn handle_invalid<'a>(
//!         &'a self,
//!         _ctx: &'a ActionContext,
//!         _event: &'a InvalidMessageEvent,
//!     ) -> ActionFuture<'a> {
//!         Box::pin(async { Ok(()) })
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use atna_protocol::{InvalidMessageEvent, MessageEvent, SecurityAlert};
use atna_transport::TransportRegistry;

mod chain;
mod error;
mod registry;

#[cfg(test)]
mod test_support;

pub mod forward;
pub mod log;
pub mod store;

pub use chain::{ActionChain, ActionFailure, DispatchReport};
pub use error::{ActionError, ActionResult};
pub use forward::ForwardAction;
pub use log::{LogAction, LogFile, LogFiles};
pub use registry::{ActionDeps, ActionFactory, ActionRegistry};
pub use store::{
    AUDIT_MESSAGE_TYPES, AuditAlert, AuditDecoder, AuditMessageDecoder, AuditRecord, AuditSink,
    AuditSinkError, SinkFuture, StoreAction, TracingAuditSink,
};

/// Future returned by action handlers
pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = ActionResult<()>> + Send + 'a>>;

/// What every handler gets besides the event
#[derive(Clone)]
pub struct ActionContext {
    /// Name of the endpoint the event arrived on
    pub endpoint: Arc<str>,

    /// Shared transport registry (used for forwarding)
    pub registry: Arc<TransportRegistry>,
}

impl ActionContext {
    pub fn new(endpoint: impl Into<Arc<str>>, registry: Arc<TransportRegistry>) -> Self {
        Self {
            endpoint: endpoint.into(),
            registry,
        }
    }
}

/// Handles the events of one endpoint
///
/// Handlers for one connection are called strictly in order, one event at a
/// time; handlers for different endpoints may run concurrently.
pub trait SyslogAction: Send + Sync {
    /// Action type name for logging and metrics
    fn name(&self) -> &'static str;

    /// A message decoded successfully
    fn handle_message<'a>(
        &'a self,
        ctx: &'a ActionContext,
        event: &'a MessageEvent,
    ) -> ActionFuture<'a>;

    /// A frame could not be decoded or framed
    fn handle_invalid<'a>(
        &'a self,
        ctx: &'a ActionContext,
        event: &'a InvalidMessageEvent,
    ) -> ActionFuture<'a>;

    /// A peer failed TLS authentication
    ///
    /// Default implementation ignores the alert.
    fn handle_security_alert<'a>(
        &'a self,
        _ctx: &'a ActionContext,
        _alert: &'a SecurityAlert,
    ) -> ActionFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}
