//! Action Registry - Configuration-driven action creation
//!
//! Maps action type names (as written in an endpoint's `actions` list) to
//! factories. Building an endpoint's chain fails on the first unknown name,
//! before the endpoint starts.
//!
//! # Example
//!
//! ```ignore
//! let registry = ActionRegistry::with_builtin();
//! let chain = registry.build_chain(&endpoint, &ActionDeps::default())?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use atna_transport::EndpointConfig;

use crate::chain::ActionChain;
use crate::forward::ForwardFactory;
use crate::log::{LogFactory, LogFiles};
use crate::store::{
    AuditDecoder, AuditMessageDecoder, AuditSink, StoreFactory, TracingAuditSink,
};
use crate::{ActionError, ActionResult, SyslogAction};

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

/// Collaborators shared by every action the registry creates
#[derive(Clone)]
pub struct ActionDeps {
    /// Audit decoder used by `store`
    pub decoder: Arc<dyn AuditDecoder>,

    /// Audit sink used by `store`
    pub sink: Arc<dyn AuditSink>,

    /// Open log files shared by every `log` action
    pub log_files: Arc<LogFiles>,
}

impl ActionDeps {
    pub fn new(decoder: Arc<dyn AuditDecoder>, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            decoder,
            sink,
            log_files: Arc::new(LogFiles::new()),
        }
    }
}

impl Default for ActionDeps {
    fn default() -> Self {
        Self::new(Arc::new(AuditMessageDecoder::new()), Arc::new(TracingAuditSink))
    }
}

/// Factory trait for creating actions
pub trait ActionFactory: Send + Sync {
    /// Create an action for one endpoint
    ///
    /// # Errors
    /// Returns `ActionError::Config` if the endpoint lacks a setting this
    /// action needs
    fn create(
        &self,
        endpoint: &EndpointConfig,
        deps: &ActionDeps,
    ) -> ActionResult<Box<dyn SyslogAction>>;
}

/// Registry of action factories keyed by type name
pub struct ActionRegistry {
    factories: HashMap<String, Box<dyn ActionFactory>>,
}

impl ActionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with `log`, `store` and `forward` registered
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("log", LogFactory);
        registry.register("store", StoreFactory);
        registry.register("forward", ForwardFactory);
        registry
    }

    /// Register an action factory
    ///
    /// # Panics
    /// Panics if a factory is already registered with this name.
    /// Use `try_register` for fallible registration.
    pub fn register<F: ActionFactory + 'static>(&mut self, type_name: &str, factory: F) {
        if self.factories.contains_key(type_name) {
            panic!("action factory '{type_name}' already registered");
        }
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
    }

    /// Try to register an action factory
    ///
    /// Returns `false` if a factory is already registered with this name.
    pub fn try_register<F: ActionFactory + 'static>(
        &mut self,
        type_name: &str,
        factory: F,
    ) -> bool {
        if self.factories.contains_key(type_name) {
            return false;
        }
        self.factories
            .insert(type_name.to_string(), Box::new(factory));
        true
    }

    /// Create one action by type name
    pub fn create(
        &self,
        type_name: &str,
        endpoint: &EndpointConfig,
        deps: &ActionDeps,
    ) -> ActionResult<Box<dyn SyslogAction>> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| ActionError::UnknownAction {
                name: type_name.to_string(),
                available: self.available_types().join(", "),
            })?;

        factory.create(endpoint, deps)
    }

    /// Build the ordered chain for `endpoint.actions`
    pub fn build_chain(
        &self,
        endpoint: &EndpointConfig,
        deps: &ActionDeps,
    ) -> ActionResult<ActionChain> {
        let actions = endpoint
            .actions
            .iter()
            .map(|name| self.create(name, endpoint, deps))
            .collect::<ActionResult<Vec<_>>>()?;

        Ok(ActionChain::new(actions))
    }

    /// Check if an action type is registered
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted
    pub fn available_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
