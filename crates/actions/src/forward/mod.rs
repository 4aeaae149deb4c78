//! Forward Action - Relay original bytes downstream
//!
//! Submits the unmodified message text to `TransportRegistry::forward` for
//! every configured target. Valid and invalid messages are forwarded alike,
//! so a downstream collector sees exactly what this one received.
//!
//! Forwarding is fire-and-forget: the handler returns as soon as the sends
//! are spawned, and delivery failures only show up in the registry's
//! `ForwardMetrics` and the log.

use bytes::Bytes;
use url::Url;

use atna_protocol::{InvalidMessageEvent, MessageEvent};
use atna_transport::EndpointConfig;

use crate::registry::{ActionDeps, ActionFactory};
use crate::{ActionContext, ActionError, ActionFuture, ActionResult, SyslogAction};

#[cfg(test)]
#[path = "forward_test.rs"]
mod tests;

/// Re-sends every message to a fixed set of collectors
pub struct ForwardAction {
    targets: Vec<Url>,
}

impl ForwardAction {
    /// Create a forward action
    ///
    /// # Errors
    /// Returns `ActionError::Config` if `targets` is empty
    pub fn new(targets: Vec<Url>) -> ActionResult<Self> {
        if targets.is_empty() {
            return Err(ActionError::config(
                "forward action requires at least one target",
            ));
        }
        Ok(Self { targets })
    }

    pub fn targets(&self) -> &[Url] {
        &self.targets
    }

    fn submit(&self, ctx: &ActionContext, original: &str) {
        tracing::trace!(
            endpoint = %ctx.endpoint,
            targets = self.targets.len(),
            bytes = original.len(),
            "forwarding message"
        );
        ctx.registry
            .forward(&self.targets, Bytes::copy_from_slice(original.as_bytes()));
    }
}

impl SyslogAction for ForwardAction {
    fn name(&self) -> &'static str {
        "forward"
    }

    fn handle_message<'a>(
        &'a self,
        ctx: &'a ActionContext,
        event: &'a MessageEvent,
    ) -> ActionFuture<'a> {
        self.submit(ctx, event.message.original());
        Box::pin(async { Ok(()) })
    }

    fn handle_invalid<'a>(
        &'a self,
        ctx: &'a ActionContext,
        event: &'a InvalidMessageEvent,
    ) -> ActionFuture<'a> {
        self.submit(ctx, event.partial.original());
        Box::pin(async { Ok(()) })
    }
}

/// Factory for `forward`; requires at least one forward target
pub(crate) struct ForwardFactory;

impl ActionFactory for ForwardFactory {
    fn create(
        &self,
        endpoint: &EndpointConfig,
        _deps: &ActionDeps,
    ) -> ActionResult<Box<dyn SyslogAction>> {
        let action = ForwardAction::new(endpoint.forward_targets.clone()).map_err(|_| {
            ActionError::config(format!(
                "endpoint '{}': forward action requires at least one target",
                endpoint.name
            ))
        })?;
        Ok(Box::new(action))
    }
}
