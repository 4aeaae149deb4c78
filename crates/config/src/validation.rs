//! Configuration validation
//!
//! Checks everything that can be checked without touching the network or
//! the filesystem:
//! - At least one endpoint, names unique and non-empty
//! - Listen addresses and forward targets are URIs with a known scheme
//! - `stcp` endpoints name a server certificate and key
//! - Actions are known and have what they need (`log_path`, targets)
//! - `max_message_size` is positive and at most 16 MiB

use std::collections::HashSet;

use crate::Config;
use crate::endpoints::{EndpointSection, KNOWN_ACTIONS, is_known_action, is_known_scheme};
use crate::error::{ConfigError, Result};

/// Upper bound on `max_message_size`; every stream session may buffer this much
pub const MAX_MESSAGE_SIZE_LIMIT: usize = 16 * 1024 * 1024;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.endpoints.is_empty() {
        return Err(ConfigError::NoEndpoints);
    }

    let mut names = HashSet::new();
    for endpoint in &config.endpoints {
        if endpoint.name.trim().is_empty() {
            return Err(ConfigError::missing_field("endpoint", &endpoint.address, "name"));
        }
        if !names.insert(endpoint.name.as_str()) {
            return Err(ConfigError::DuplicateEndpoint(endpoint.name.clone()));
        }
        validate_endpoint(endpoint)?;
    }

    validate_forwarding(config)?;
    Ok(())
}

fn validate_endpoint(endpoint: &EndpointSection) -> Result<()> {
    let name = endpoint.name.as_str();

    let address = endpoint.address_url()?;
    if !is_known_scheme(address.scheme()) {
        return Err(unknown_scheme(name, "address", address.scheme()));
    }

    for target in endpoint.forward_urls()? {
        if !is_known_scheme(target.scheme()) {
            return Err(unknown_scheme(name, "forward", target.scheme()));
        }
    }

    if endpoint.max_message_size == 0 {
        return Err(ConfigError::invalid_value(
            "endpoint",
            name,
            "max_message_size",
            "must be greater than 0",
        ));
    }
    if endpoint.max_message_size > MAX_MESSAGE_SIZE_LIMIT {
        return Err(ConfigError::invalid_value(
            "endpoint",
            name,
            "max_message_size",
            format!("must be at most {MAX_MESSAGE_SIZE_LIMIT} bytes"),
        ));
    }

    if address.scheme() == "stcp" {
        let tls = endpoint
            .tls
            .as_ref()
            .ok_or_else(|| ConfigError::missing_field("endpoint", name, "tls"))?;
        if tls.server_certificate.is_none() {
            return Err(ConfigError::missing_field("tls", name, "server_certificate"));
        }
        if tls.server_key.is_none() {
            return Err(ConfigError::missing_field("tls", name, "server_key"));
        }
    }

    for action in &endpoint.actions {
        match action.as_str() {
            "log" if endpoint.log_path.is_none() => {
                return Err(ConfigError::missing_field("endpoint", name, "log_path"));
            }
            "forward" if endpoint.forward.is_empty() => {
                return Err(ConfigError::missing_field("endpoint", name, "forward"));
            }
            other if !is_known_action(other) => {
                return Err(ConfigError::invalid_value(
                    "endpoint",
                    name,
                    "actions",
                    format!(
                        "unknown action '{other}', available: [{}]",
                        KNOWN_ACTIONS.join(", ")
                    ),
                ));
            }
            _ => {}
        }
    }

    if endpoint.actions.is_empty() {
        tracing::warn!(endpoint = name, "endpoint has no actions, events will be dropped");
    }

    Ok(())
}

fn validate_forwarding(config: &Config) -> Result<()> {
    let forwarding = &config.forwarding;

    if forwarding.client_certificate.is_some() != forwarding.client_key.is_some() {
        return Err(ConfigError::invalid_value(
            "forwarding",
            "forwarding",
            "client_certificate",
            "client_certificate and client_key must be set together",
        ));
    }

    let needs_tls = config
        .endpoints
        .iter()
        .flat_map(|e| e.forward.iter())
        .any(|target| target.starts_with("stcp://"));
    if needs_tls && !forwarding.has_client_tls() {
        return Err(ConfigError::missing_field(
            "forwarding",
            "forwarding",
            "ca_certificates",
        ));
    }

    Ok(())
}

fn unknown_scheme(endpoint: &str, field: &'static str, scheme: &str) -> ConfigError {
    ConfigError::invalid_value(
        "endpoint",
        endpoint,
        field,
        format!("unknown scheme '{scheme}'"),
    )
}
