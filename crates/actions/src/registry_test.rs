//! Tests for the action registry

use std::path::PathBuf;

use atna_protocol::{InvalidMessageEvent, MessageEvent};
use url::Url;

use super::*;
use crate::{ActionContext, ActionFuture};

/// Accepts everything, does nothing
struct Nothing;

impl SyslogAction for Nothing {
    fn name(&self) -> &'static str {
        "nothing"
    }

    fn handle_message<'a>(
        &'a self,
        _ctx: &'a ActionContext,
        _event: &'a MessageEvent,
    ) -> ActionFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    fn handle_invalid<'a>(
        &'a self,
        _ctx: &'a ActionContext,
        _event: &'a InvalidMessageEvent,
    ) -> ActionFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

struct NothingFactory;

impl ActionFactory for NothingFactory {
    fn create(
        &self,
        _endpoint: &EndpointConfig,
        _deps: &ActionDeps,
    ) -> ActionResult<Box<dyn SyslogAction>> {
        Ok(Box::new(Nothing))
    }
}

fn endpoint(actions: &[&str]) -> EndpointConfig {
    EndpointConfig::new("audit-in", Url::parse("tcp://127.0.0.1:6514").unwrap())
        .with_actions(actions.iter().copied())
        .with_log_path(PathBuf::from("/tmp/atna-registry-test.log"))
        .with_forward_targets(vec![Url::parse("udp://127.0.0.1:514").unwrap()])
}

#[test]
fn test_builtin_types() {
    let registry = ActionRegistry::with_builtin();
    assert_eq!(registry.available_types(), vec!["forward", "log", "store"]);
    assert_eq!(registry.len(), 3);
    assert!(registry.contains("store"));
    assert!(!registry.contains("archive"));
}

#[test]
fn test_new_registry_is_empty() {
    let registry = ActionRegistry::default();
    assert!(registry.is_empty());
    assert!(registry.available_types().is_empty());
}

#[test]
#[should_panic(expected = "already registered")]
fn test_duplicate_register_panics() {
    let mut registry = ActionRegistry::with_builtin();
    registry.register("log", NothingFactory);
}

#[test]
fn test_try_register() {
    let mut registry = ActionRegistry::with_builtin();
    assert!(!registry.try_register("log", NothingFactory));
    assert!(registry.try_register("nothing", NothingFactory));
    assert!(registry.contains("nothing"));
}

#[test]
fn test_build_chain_keeps_order() {
    let mut registry = ActionRegistry::with_builtin();
    registry.register("nothing", NothingFactory);

    let chain = registry
        .build_chain(
            &endpoint(&["store", "nothing", "log", "forward"]),
            &ActionDeps::default(),
        )
        .unwrap();

    assert_eq!(chain.names(), vec!["store", "nothing", "log", "forward"]);
}

#[test]
fn test_empty_action_list_builds_empty_chain() {
    let chain = ActionRegistry::with_builtin()
        .build_chain(&endpoint(&[]), &ActionDeps::default())
        .unwrap();
    assert!(chain.is_empty());
}

#[test]
fn test_unknown_action_fails_build() {
    let err = ActionRegistry::with_builtin()
        .build_chain(&endpoint(&["log", "archive"]), &ActionDeps::default())
        .err()
        .unwrap();

    assert_eq!(
        err.to_string(),
        "unknown action type 'archive', available: [forward, log, store]"
    );
}

#[test]
fn test_factory_error_fails_build() {
    let config = EndpointConfig::new("bare", Url::parse("udp://0.0.0.0:514").unwrap())
        .with_actions(["log"]);

    let err = ActionRegistry::with_builtin()
        .build_chain(&config, &ActionDeps::default())
        .err()
        .unwrap();

    assert!(matches!(err, ActionError::Config(_)));
}
