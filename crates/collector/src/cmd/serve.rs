//! Serve command - run every configured endpoint until Ctrl-C

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use atna_actions::{ActionDeps, ActionRegistry};
use atna_config::{Config, LogLevel};
use atna_pipeline::EndpointListener;
use atna_transport::TransportRegistry;
use tracing::{info, warn};

use crate::logging;

pub async fn run(config_path: &Path, log_level: Option<LogLevel>) -> Result<()> {
    let config = Config::from_file(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    logging::init(&config.log.clone().with_level(log_level))?;

    info!(
        config = %config_path.display(),
        endpoints = config.endpoints.len(),
        "starting atna collector"
    );

    let listeners = build_listeners(&config)?;
    for listener in &listeners {
        listener
            .start()
            .with_context(|| format!("failed to start endpoint '{}'", listener.name()))?;
    }

    info!(endpoints = ?config.endpoint_names(), "collector running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received, stopping endpoints");

    for listener in &listeners {
        listener.stop();
    }
    for listener in &listeners {
        listener.wait().await;

        let metrics = listener.metrics();
        let transport = listener.transport_metrics();
        info!(
            endpoint = listener.name(),
            state = %listener.state(),
            received = transport.messages_received,
            invalid = transport.invalid_messages,
            dispatched = metrics.events_dispatched,
            action_failures = metrics.action_failures,
            restarts = metrics.restarts,
            "endpoint stopped"
        );
        if metrics.action_failures > 0 {
            warn!(
                endpoint = listener.name(),
                failures = metrics.action_failures,
                "actions failed during this run"
            );
        }
    }

    info!("collector stopped");
    Ok(())
}

/// Build one listener per endpoint, sharing the transport and action registries
pub fn build_listeners(config: &Config) -> Result<Vec<EndpointListener>> {
    let options = config
        .forwarding
        .forward_options()
        .context("failed to prepare forwarding")?;
    let registry = Arc::new(
        TransportRegistry::with_builtin(options).context("failed to build transport registry")?,
    );
    let actions = ActionRegistry::with_builtin();
    let deps = ActionDeps::default();
    let policy = config.supervisor.restart_policy();

    config
        .endpoint_configs()?
        .into_iter()
        .map(|endpoint| {
            let name = endpoint.name.clone();
            EndpointListener::new(endpoint, Arc::clone(&registry), &actions, &deps)
                .map(|listener| listener.with_restart_policy(policy))
                .with_context(|| format!("failed to build endpoint '{name}'"))
        })
        .collect()
}
