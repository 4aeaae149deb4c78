//! Endpoint configuration types
//!
//! One `[[endpoints]]` table per listening endpoint. The address scheme
//! selects the transport; everything else has a default.

use std::path::PathBuf;
use std::time::Duration;

use atna_protocol::DEFAULT_MAX_MESSAGE_SIZE;
use atna_transport::config::{
    DEFAULT_MAX_CONNECTIONS, DEFAULT_READ_TIMEOUT, DEFAULT_SESSION_TIMEOUT,
    DEFAULT_SOCKET_BUFFER_SIZE,
};
use atna_transport::{EndpointConfig, TlsSettings};
use serde::Deserialize;
use url::Url;

use crate::error::{ConfigError, Result};

/// Transport schemes the collector can listen on and forward to
pub const KNOWN_SCHEMES: &[&str] = &["http", "stcp", "tcp", "udp"];

/// Built-in action types
pub const KNOWN_ACTIONS: &[&str] = &["forward", "log", "store"];

/// Check if a scheme names a built-in transport
pub fn is_known_scheme(scheme: &str) -> bool {
    KNOWN_SCHEMES.contains(&scheme)
}

/// Check if a name is a built-in action type
pub fn is_known_action(name: &str) -> bool {
    KNOWN_ACTIONS.contains(&name)
}

/// One `[[endpoints]]` entry
///
/// # Example
///
/// ```toml
/// [[endpoints]]
/// name = "tls-in"
/// address = "stcp://0.0.0.0:6514"
/// actions = ["log", "store", "forward"]
/// forward = ["udp://archive.example.org:514"]
/// log_path = "/var/log/atna/tls-in.log"
/// read_timeout = "30s"
/// session_timeout = "5m"
///
/// [endpoints.tls]
/// server_certificate = "/etc/atna/server.pem"
/// server_key = "/etc/atna/server.key"
/// trusted_client_thumbprints = ["3A:5F:..."]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointSection {
    pub name: String,

    /// Listen URI (`tcp://`, `stcp://`, `udp://`, `http://`)
    pub address: String,

    /// Largest frame accepted, in bytes
    pub max_message_size: usize,

    /// Per-read timeout (0 = none)
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Total session timeout (0 = none)
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Concurrent connections for stream transports
    pub max_connections: usize,

    /// Ordered action type names
    pub actions: Vec<String>,

    /// Forward target URIs
    pub forward: Vec<String>,

    /// File written by the `log` action
    pub log_path: Option<PathBuf>,

    /// Set TCP_NODELAY on accepted sockets
    pub no_delay: bool,

    pub socket_buffer_size: usize,

    pub tls: Option<TlsSection>,
}

impl Default for EndpointSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: String::new(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            actions: Vec::new(),
            forward: Vec::new(),
            log_path: None,
            no_delay: true,
            socket_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            tls: None,
        }
    }
}

/// `[endpoints.tls]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsSection {
    pub server_certificate: Option<PathBuf>,
    pub server_key: Option<PathBuf>,
    /// Certificates whose thumbprints are trusted
    pub trusted_client_certificates: Vec<PathBuf>,
    /// SHA-256 thumbprints, hex with optional separators
    pub trusted_client_thumbprints: Vec<String>,
    /// CA certificates used to validate client chains
    pub client_ca_certificates: Vec<PathBuf>,
}

impl From<&TlsSection> for TlsSettings {
    fn from(tls: &TlsSection) -> Self {
        Self {
            server_certificate: tls.server_certificate.clone(),
            server_key: tls.server_key.clone(),
            trusted_client_certificates: tls.trusted_client_certificates.clone(),
            trusted_client_thumbprints: tls.trusted_client_thumbprints.clone(),
            client_ca_certificates: tls.client_ca_certificates.clone(),
        }
    }
}

impl EndpointSection {
    /// Parsed listen address
    pub fn address_url(&self) -> Result<Url> {
        parse_uri(&self.name, "address", &self.address)
    }

    /// Parsed forward targets
    pub fn forward_urls(&self) -> Result<Vec<Url>> {
        self.forward
            .iter()
            .map(|target| parse_uri(&self.name, "forward", target))
            .collect()
    }

    /// Build the runtime endpoint configuration
    pub fn to_endpoint_config(&self) -> Result<EndpointConfig> {
        let mut config = EndpointConfig::new(self.name.clone(), self.address_url()?)
            .with_max_message_size(self.max_message_size)
            .with_read_timeout(self.read_timeout)
            .with_session_timeout(self.session_timeout)
            .with_max_connections(self.max_connections)
            .with_actions(self.actions.iter().cloned())
            .with_forward_targets(self.forward_urls()?);

        config.log_path = self.log_path.clone();
        config.nodelay = self.no_delay;
        config.socket_buffer_size = self.socket_buffer_size;
        config.tls = self.tls.as_ref().map(TlsSettings::from);

        Ok(config)
    }
}

fn parse_uri(endpoint: &str, field: &'static str, value: &str) -> Result<Url> {
    if value.is_empty() {
        return Err(ConfigError::missing_field("endpoint", endpoint, field));
    }
    let url = Url::parse(value).map_err(|e| {
        ConfigError::invalid_value("endpoint", endpoint, field, format!("'{value}': {e}"))
    })?;
    if url.host_str().is_none() {
        return Err(ConfigError::invalid_value(
            "endpoint",
            endpoint,
            field,
            format!("'{value}' has no host"),
        ));
    }
    Ok(url)
}
