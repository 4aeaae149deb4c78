//! Action Chain - Ordered, failure-isolated dispatch
//!
//! Unlike a fail-fast pipeline, one failing action never stops the chain:
//! every action sees every event, in configured order.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use atna_protocol::TransportEvent;
use futures_util::FutureExt;

use crate::{ActionContext, ActionFuture, ActionResult, SyslogAction};

#[cfg(test)]
#[path = "chain_test.rs"]
mod tests;

/// One action that did not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    pub action: &'static str,
    pub reason: String,
    pub panicked: bool,
}

/// Outcome of dispatching one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Actions invoked
    pub invoked: usize,

    /// Actions that returned an error or panicked
    pub failures: Vec<ActionFailure>,
}

impl DispatchReport {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Actions of one endpoint, in configured order
pub struct ActionChain {
    actions: Vec<Box<dyn SyslogAction>>,
}

impl ActionChain {
    pub fn new(actions: Vec<Box<dyn SyslogAction>>) -> Self {
        Self { actions }
    }

    /// Create an empty chain (events are dropped)
    pub fn empty() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Names of all actions, in order
    pub fn names(&self) -> Vec<&'static str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    /// Run every action on `event`
    ///
    /// Errors and panics are caught per action, logged, and reported; they
    /// never prevent later actions from running.
    pub async fn dispatch(&self, ctx: &ActionContext, event: &TransportEvent) -> DispatchReport {
        let mut report = DispatchReport::default();

        for action in &self.actions {
            report.invoked += 1;

            let failure = match invoke(action.as_ref(), ctx, event).await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => {
                    tracing::warn!(
                        endpoint = %ctx.endpoint,
                        action = action.name(),
                        event = event.kind(),
                        peer = %event.solicitor(),
                        error = %e,
                        "action failed"
                    );
                    ActionFailure {
                        action: action.name(),
                        reason: e.to_string(),
                        panicked: false,
                    }
                }
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    tracing::error!(
                        endpoint = %ctx.endpoint,
                        action = action.name(),
                        event = event.kind(),
                        peer = %event.solicitor(),
                        panic = %reason,
                        "action panicked"
                    );
                    ActionFailure {
                        action: action.name(),
                        reason,
                        panicked: true,
                    }
                }
            };
            report.failures.push(failure);
        }

        report
    }
}

impl Default for ActionChain {
    fn default() -> Self {
        Self::empty()
    }
}

/// Call the handler for `event`, catching panics both while building the
/// future and while polling it
async fn invoke(
    action: &dyn SyslogAction,
    ctx: &ActionContext,
    event: &TransportEvent,
) -> Result<ActionResult<()>, Box<dyn Any + Send>> {
    let future = std::panic::catch_unwind(AssertUnwindSafe(|| handler(action, ctx, event)))?;
    AssertUnwindSafe(future).catch_unwind().await
}

fn handler<'a>(
    action: &'a dyn SyslogAction,
    ctx: &'a ActionContext,
    event: &'a TransportEvent,
) -> ActionFuture<'a> {
    match event {
        TransportEvent::Message(message) => action.handle_message(ctx, message),
        TransportEvent::Invalid(invalid) => action.handle_invalid(ctx, invalid),
        TransportEvent::SecurityAlert(alert) => action.handle_security_alert(ctx, alert),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
