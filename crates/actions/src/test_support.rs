//! Shared fixtures for action tests

use std::net::SocketAddr;
use std::sync::Arc;

use atna_protocol::{
    InvalidMessageEvent, MessageEvent, RawMessage, SecurityAlert, SessionId, TransportEvent,
};
use atna_transport::{ForwardOptions, TransportRegistry};

use crate::ActionContext;

pub(crate) fn peer() -> SocketAddr {
    SocketAddr::from(([192, 168, 1, 20], 40514))
}

pub(crate) fn local() -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 1], 6514))
}

pub(crate) fn context() -> ActionContext {
    let registry = TransportRegistry::new(&ForwardOptions::default());
    ActionContext::new("test-endpoint", Arc::new(registry))
}

pub(crate) fn raw_message(body: &str) -> RawMessage {
    RawMessage::builder(SessionId::new())
        .facility(10)
        .severity(5)
        .version(1)
        .hostname("node-a")
        .process_name("pacs")
        .process_id("4711")
        .message_type("IHE+RFC-3881")
        .body(body)
        .original(format!("<85>1 - node-a pacs 4711 IHE+RFC-3881 - {body}"))
        .build()
}

pub(crate) fn message_event(body: &str) -> MessageEvent {
    MessageEvent::new(raw_message(body), peer(), local())
}

pub(crate) fn invalid_event(original: &str, fault: &str) -> InvalidMessageEvent {
    let partial = RawMessage::builder(SessionId::new())
        .body(original)
        .original(original)
        .build();
    InvalidMessageEvent::new(partial, peer(), local(), fault)
}

pub(crate) fn security_alert(reason: &str) -> SecurityAlert {
    SecurityAlert::new(peer(), local(), reason)
}

pub(crate) fn message(body: &str) -> TransportEvent {
    TransportEvent::Message(message_event(body))
}
