//! Endpoint configuration
//!
//! One `EndpointConfig` describes one listening endpoint: where to bind, how
//! to frame, which actions to run and where to forward. It is built once at
//! startup and shared as `Arc<EndpointConfig>`.

use std::path::PathBuf;
use std::time::Duration;

use atna_protocol::DEFAULT_MAX_MESSAGE_SIZE;
use url::Url;

use crate::common::limit;
use crate::error::{Result, TransportError};

/// Default per-read timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default total session timeout
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(300);

/// Default bound on concurrently served connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Default socket buffer size (256KB)
pub const DEFAULT_SOCKET_BUFFER_SIZE: usize = 256 * 1024;

/// Default bound on one forward (connect + send)
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for one endpoint
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Endpoint name (used in logs)
    pub name: String,

    /// Listen address; the scheme selects the transport
    pub address: Url,

    /// Largest frame accepted
    pub max_message_size: usize,

    /// Per-read timeout (zero = no limit)
    pub read_timeout: Duration,

    /// Total session timeout (zero = no limit)
    pub session_timeout: Duration,

    /// Maximum concurrent connections for streaming transports
    pub max_connections: usize,

    /// Ordered action type names
    pub actions: Vec<String>,

    /// Downstream collectors
    pub forward_targets: Vec<Url>,

    /// TLS settings (required for `stcp`)
    pub tls: Option<TlsSettings>,

    /// File used by the `log` action
    pub log_path: Option<PathBuf>,

    /// Enable TCP_NODELAY
    pub nodelay: bool,

    /// Socket send/receive buffer size
    pub socket_buffer_size: usize,
}

impl EndpointConfig {
    /// Create a config with defaults for everything but name and address
    pub fn new(name: impl Into<String>, address: Url) -> Self {
        Self {
            name: name.into(),
            address,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            actions: Vec::new(),
            forward_targets: Vec::new(),
            tls: None,
            log_path: None,
            nodelay: true,
            socket_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
        }
    }

    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    #[must_use]
    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_forward_targets(mut self, targets: Vec<Url>) -> Self {
        self.forward_targets = targets;
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.tls = Some(tls);
        self
    }

    #[must_use]
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Transport scheme of the listen address
    #[inline]
    pub fn scheme(&self) -> &str {
        self.address.scheme()
    }

    /// `host:port` string to bind to
    pub fn bind_address(&self) -> Result<String> {
        socket_address(&self.address)
    }

    /// Per-read timeout, `None` when unlimited
    #[inline]
    pub fn read_timeout(&self) -> Option<Duration> {
        limit(self.read_timeout)
    }

    /// Session timeout, `None` when unlimited
    #[inline]
    pub fn session_timeout(&self) -> Option<Duration> {
        limit(self.session_timeout)
    }
}

/// TLS settings for a secure endpoint
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    /// PEM certificate chain presented by the server
    pub server_certificate: Option<PathBuf>,

    /// PEM private key for `server_certificate`
    pub server_key: Option<PathBuf>,

    /// PEM certificates whose thumbprints are trusted (also used as trust anchors)
    pub trusted_client_certificates: Vec<PathBuf>,

    /// Trusted SHA-256 thumbprints (hex, separators ignored)
    pub trusted_client_thumbprints: Vec<String>,

    /// PEM CA certificates used to validate client chains
    pub client_ca_certificates: Vec<PathBuf>,
}

impl TlsSettings {
    /// Settings with a server identity and no client restrictions
    pub fn new(server_certificate: impl Into<PathBuf>, server_key: impl Into<PathBuf>) -> Self {
        Self {
            server_certificate: Some(server_certificate.into()),
            server_key: Some(server_key.into()),
            ..Self::default()
        }
    }

    /// Whether client certificates are restricted to a trusted set
    pub fn restricts_clients(&self) -> bool {
        !self.trusted_client_certificates.is_empty() || !self.trusted_client_thumbprints.is_empty()
    }
}

/// Default port for each built-in scheme
pub fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "tcp" | "udp" => Some(514),
        "stcp" => Some(6514),
        "http" => Some(80),
        _ => None,
    }
}

/// Resolve a transport URI into a `host:port` string
pub fn socket_address(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TransportError::invalid_address(url.as_str(), "missing host"))?;
    let port = url
        .port()
        .or_else(|| default_port(url.scheme()))
        .ok_or_else(|| TransportError::invalid_address(url.as_str(), "missing port"))?;
    Ok(format!("{host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = EndpointConfig::new("audit", url("tcp://0.0.0.0:1514"));
        assert_eq!(config.max_message_size, 64 * 1024);
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.session_timeout, Duration::from_secs(300));
        assert_eq!(config.max_connections, 1024);
        assert!(config.nodelay);
        assert!(config.tls.is_none());
        assert_eq!(config.scheme(), "tcp");
    }

    #[test]
    fn test_bind_address() {
        let config = EndpointConfig::new("a", url("tcp://127.0.0.1:1514"));
        assert_eq!(config.bind_address().unwrap(), "127.0.0.1:1514");

        let config = EndpointConfig::new("a", url("stcp://0.0.0.0"));
        assert_eq!(config.bind_address().unwrap(), "0.0.0.0:6514");

        let config = EndpointConfig::new("a", url("udp://[::1]:5140"));
        assert_eq!(config.bind_address().unwrap(), "[::1]:5140");
    }

    #[test]
    fn test_bind_address_missing_port_for_unknown_scheme() {
        let config = EndpointConfig::new("a", url("ftp://host"));
        assert!(config.bind_address().is_err());
    }

    #[test]
    fn test_zero_timeouts_mean_unlimited() {
        let config = EndpointConfig::new("a", url("tcp://127.0.0.1:0"))
            .with_read_timeout(Duration::ZERO)
            .with_session_timeout(Duration::from_secs(5));
        assert_eq!(config.read_timeout(), None);
        assert_eq!(config.session_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_builders() {
        let config = EndpointConfig::new("a", url("http://127.0.0.1:8080"))
            .with_actions(["log", "forward"])
            .with_forward_targets(vec![url("udp://10.0.0.1:514")])
            .with_log_path("/tmp/audit.log")
            .with_max_connections(8)
            .with_max_message_size(100);

        assert_eq!(config.actions, vec!["log", "forward"]);
        assert_eq!(config.forward_targets.len(), 1);
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.max_message_size, 100);
        assert!(config.log_path.is_some());
    }

    #[test]
    fn test_tls_restricts_clients() {
        let tls = TlsSettings::new("server.pem", "server.key");
        assert!(!tls.restricts_clients());

        let tls = TlsSettings {
            trusted_client_thumbprints: vec!["AB:CD".into()],
            ..tls
        };
        assert!(tls.restricts_clients());
    }
}
