//! Tests for the action chain

use std::sync::Arc;

use atna_protocol::{InvalidMessageEvent, MessageEvent, SecurityAlert, TransportEvent};
use parking_lot::Mutex;

use super::*;
use crate::test_support::{context, invalid_event, message, security_alert};
use crate::{ActionError, ActionFuture};

type Journal = Arc<Mutex<Vec<String>>>;

/// Records which handler ran
struct Recording {
    name: &'static str,
    journal: Journal,
}

impl SyslogAction for Recording {
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle_message<'a>(
        &'a self,
        _ctx: &'a ActionContext,
        event: &'a MessageEvent,
    ) -> ActionFuture<'a> {
        Box::pin(async move {
            self.journal
                .lock()
                .push(format!("{}:message:{}", self.name, event.message.body()));
            Ok(())
        })
    }

    fn handle_invalid<'a>(
        &'a self,
        _ctx: &'a ActionContext,
        _event: &'a InvalidMessageEvent,
    ) -> ActionFuture<'a> {
        Box::pin(async move {
            self.journal.lock().push(format!("{}:invalid", self.name));
            Ok(())
        })
    }

    fn handle_security_alert<'a>(
        &'a self,
        _ctx: &'a ActionContext,
        _alert: &'a SecurityAlert,
    ) -> ActionFuture<'a> {
        Box::pin(async move {
            self.journal.lock().push(format!("{}:alert", self.name));
            Ok(())
        })
    }
}

enum Fault {
    Error,
    PanicInFuture,
    PanicBeforeFuture,
}

/// Fails every message in the configured way
struct Faulty(Fault);

impl SyslogAction for Faulty {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn handle_message<'a>(
        &'a self,
        _ctx: &'a ActionContext,
        _event: &'a MessageEvent,
    ) -> ActionFuture<'a> {
        match self.0 {
            Fault::Error => Box::pin(async { Err(ActionError::config("broken")) }),
            Fault::PanicInFuture => Box::pin(async { panic!("boom in future") }),
            Fault::PanicBeforeFuture => panic!("boom before future"),
        }
    }

    fn handle_invalid<'a>(
        &'a self,
        _ctx: &'a ActionContext,
        _event: &'a InvalidMessageEvent,
    ) -> ActionFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

fn recording(name: &'static str, journal: &Journal) -> Box<dyn SyslogAction> {
    Box::new(Recording {
        name,
        journal: Arc::clone(journal),
    })
}

#[tokio::test]
async fn test_empty_chain() {
    let chain = ActionChain::default();
    assert!(chain.is_empty());

    let report = chain.dispatch(&context(), &message("x")).await;
    assert_eq!(report.invoked, 0);
    assert!(report.is_success());
}

#[tokio::test]
async fn test_actions_run_in_order() {
    let journal = Journal::default();
    let chain = ActionChain::new(vec![
        recording("first", &journal),
        recording("second", &journal),
    ]);
    assert_eq!(chain.names(), vec!["first", "second"]);

    let ctx = context();
    chain.dispatch(&ctx, &message("a")).await;
    chain.dispatch(&ctx, &message("b")).await;

    assert_eq!(
        *journal.lock(),
        vec![
            "first:message:a",
            "second:message:a",
            "first:message:b",
            "second:message:b"
        ]
    );
}

#[tokio::test]
async fn test_events_route_to_matching_handler() {
    let journal = Journal::default();
    let chain = ActionChain::new(vec![recording("rec", &journal)]);
    let ctx = context();

    chain
        .dispatch(&ctx, &TransportEvent::Invalid(invalid_event("junk", "missing priority")))
        .await;
    chain
        .dispatch(&ctx, &TransportEvent::SecurityAlert(security_alert("bad cert")))
        .await;

    assert_eq!(*journal.lock(), vec!["rec:invalid", "rec:alert"]);
}

#[tokio::test]
async fn test_failing_action_does_not_stop_chain() {
    for fault in [Fault::Error, Fault::PanicInFuture, Fault::PanicBeforeFuture] {
        let journal = Journal::default();
        let chain = ActionChain::new(vec![Box::new(Faulty(fault)), recording("after", &journal)]);
        let ctx = context();

        let report = chain.dispatch(&ctx, &message("one")).await;
        assert_eq!(report.invoked, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].action, "faulty");

        // Later messages are still dispatched
        chain.dispatch(&ctx, &message("two")).await;
        assert_eq!(
            *journal.lock(),
            vec!["after:message:one", "after:message:two"]
        );
    }
}

#[tokio::test]
async fn test_failure_report_details() {
    let ctx = context();

    let chain = ActionChain::new(vec![Box::new(Faulty(Fault::Error))]);
    let report = chain.dispatch(&ctx, &message("m")).await;
    assert!(!report.failures[0].panicked);
    assert_eq!(report.failures[0].reason, "invalid configuration: broken");

    let chain = ActionChain::new(vec![Box::new(Faulty(Fault::PanicInFuture))]);
    let report = chain.dispatch(&ctx, &message("m")).await;
    assert!(report.failures[0].panicked);
    assert_eq!(report.failures[0].reason, "boom in future");
}

#[tokio::test]
async fn test_default_security_alert_handler_is_noop() {
    let chain = ActionChain::new(vec![Box::new(Faulty(Fault::Error))]);
    let report = chain
        .dispatch(&context(), &TransportEvent::SecurityAlert(security_alert("x")))
        .await;
    assert_eq!(report.invoked, 1);
    assert!(report.is_success());
}
