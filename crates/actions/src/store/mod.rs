//! Store Action - Decode and persist audit messages
//!
//! Every received message goes through the `AuditDecoder`:
//!
//! | Outcome  | Effect                                   |
//! |----------|------------------------------------------|
//! | Accepted | `AuditSink::store` with an `AuditRecord` |
//! | Rejected | `AuditSink::alert(Rejected)` and a warning |
//! | Error    | action error (logged by the chain)       |
//!
//! Invalid frames and TLS failures are reported with `AuditSink::alert`.

mod decoder;
mod sink;

use std::sync::Arc;

use atna_protocol::{InvalidMessageEvent, MessageEvent, ParseOutcome, SecurityAlert};
use atna_transport::EndpointConfig;

use crate::registry::{ActionDeps, ActionFactory};
use crate::{ActionContext, ActionError, ActionFuture, ActionResult, SyslogAction};

pub use decoder::{AUDIT_MESSAGE_TYPES, AuditDecoder, AuditMessageDecoder};
pub use sink::{AuditAlert, AuditRecord, AuditSink, AuditSinkError, SinkFuture, TracingAuditSink};

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;

/// Hands decoded audit messages to an `AuditSink`
pub struct StoreAction {
    decoder: Arc<dyn AuditDecoder>,
    sink: Arc<dyn AuditSink>,
}

impl StoreAction {
    pub fn new(decoder: Arc<dyn AuditDecoder>, sink: Arc<dyn AuditSink>) -> Self {
        Self { decoder, sink }
    }

    async fn store(&self, ctx: &ActionContext, event: &MessageEvent) -> ActionResult<()> {
        let result = self.decoder.decode(&event.message);

        match result.outcome {
            ParseOutcome::Accepted => {
                let record = AuditRecord {
                    endpoint: Arc::clone(&ctx.endpoint),
                    message: result.message.unwrap_or_else(|| event.message.clone()),
                    solicitor: event.solicitor,
                    receiver: event.receiver,
                    received_at: event.timestamp,
                    peer_thumbprint: event
                        .peer_certificate
                        .as_ref()
                        .map(|c| c.thumbprint.clone()),
                    details: result.details,
                };
                self.sink.store(record).await?;
            }
            ParseOutcome::Rejected => {
                let reason = result.summary();
                tracing::warn!(
                    endpoint = %ctx.endpoint,
                    peer = %event.solicitor,
                    session_id = %event.message.session_id(),
                    reason = %reason,
                    "audit message rejected"
                );
                self.sink
                    .alert(AuditAlert::Rejected {
                        endpoint: Arc::clone(&ctx.endpoint),
                        solicitor: event.solicitor,
                        message: event.message.clone(),
                        reason,
                    })
                    .await?;
            }
            ParseOutcome::Error => return Err(ActionError::decode(result.summary())),
        }

        Ok(())
    }
}

impl SyslogAction for StoreAction {
    fn name(&self) -> &'static str {
        "store"
    }

    fn handle_message<'a>(
        &'a self,
        ctx: &'a ActionContext,
        event: &'a MessageEvent,
    ) -> ActionFuture<'a> {
        Box::pin(self.store(ctx, event))
    }

    fn handle_invalid<'a>(
        &'a self,
        ctx: &'a ActionContext,
        event: &'a InvalidMessageEvent,
    ) -> ActionFuture<'a> {
        let alert = AuditAlert::Invalid {
            endpoint: Arc::clone(&ctx.endpoint),
            solicitor: event.solicitor,
            original: event.partial.original().to_string(),
            fault: event.fault.clone(),
        };
        Box::pin(async move { Ok(self.sink.alert(alert).await?) })
    }

    fn handle_security_alert<'a>(
        &'a self,
        ctx: &'a ActionContext,
        alert: &'a SecurityAlert,
    ) -> ActionFuture<'a> {
        let alert = AuditAlert::Security {
            endpoint: Arc::clone(&ctx.endpoint),
            solicitor: alert.solicitor,
            receiver: alert.receiver,
            reason: alert.reason.clone(),
        };
        Box::pin(async move { Ok(self.sink.alert(alert).await?) })
    }
}

/// Factory for `store`
pub(crate) struct StoreFactory;

impl ActionFactory for StoreFactory {
    fn create(
        &self,
        _endpoint: &EndpointConfig,
        deps: &ActionDeps,
    ) -> ActionResult<Box<dyn SyslogAction>> {
        Ok(Box::new(StoreAction::new(
            Arc::clone(&deps.decoder),
            Arc::clone(&deps.sink),
        )))
    }
}
