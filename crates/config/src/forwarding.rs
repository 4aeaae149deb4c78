//! Forwarding configuration
//!
//! Shared by every `forward` action: send timeout, in-flight bound, and the
//! client TLS identity used for `stcp` targets.

use std::path::PathBuf;
use std::time::Duration;

use atna_transport::tls::build_client_config;
use atna_transport::ForwardOptions;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// `[forwarding]` section
///
/// # Example
///
/// ```toml
/// [forwarding]
/// timeout = "5s"
/// max_in_flight = 512
/// ca_certificates = ["/etc/atna/upstream-ca.pem"]
/// client_certificate = "/etc/atna/relay.pem"
/// client_key = "/etc/atna/relay.key"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Bound on one send (connect + write)
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Sends running at once; more are dropped
    pub max_in_flight: usize,

    /// Trust anchors for `stcp` targets
    pub ca_certificates: Vec<PathBuf>,

    /// Client certificate presented to `stcp` targets
    pub client_certificate: Option<PathBuf>,

    pub client_key: Option<PathBuf>,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        let options = ForwardOptions::default();
        Self {
            timeout: options.timeout,
            max_in_flight: options.max_in_flight,
            ca_certificates: Vec::new(),
            client_certificate: None,
            client_key: None,
        }
    }
}

impl ForwardingConfig {
    /// Whether `stcp` targets can be reached
    pub fn has_client_tls(&self) -> bool {
        !self.ca_certificates.is_empty()
    }

    /// Build forwarding options, loading TLS material if configured
    pub fn forward_options(&self) -> Result<ForwardOptions> {
        let client_tls = if self.has_client_tls() {
            let config = build_client_config(
                &self.ca_certificates,
                self.client_certificate.as_deref(),
                self.client_key.as_deref(),
            )
            .map_err(|e| ConfigError::tls("forwarding", e))?;
            Some(config)
        } else {
            None
        };

        Ok(ForwardOptions {
            timeout: self.timeout,
            max_in_flight: self.max_in_flight.max(1),
            client_tls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atna_transport::DEFAULT_MAX_IN_FLIGHT;

    #[test]
    fn test_defaults() {
        let config: ForwardingConfig = toml::from_str("").unwrap();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_in_flight, DEFAULT_MAX_IN_FLIGHT);
        assert!(!config.has_client_tls());

        let options = config.forward_options().unwrap();
        assert!(options.client_tls.is_none());
    }

    #[test]
    fn test_parse() {
        let config: ForwardingConfig = toml::from_str(
            r#"
timeout = "2s"
max_in_flight = 8
ca_certificates = ["/etc/atna/ca.pem"]
"#,
        )
        .unwrap();
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.max_in_flight, 8);
        assert!(config.has_client_tls());
    }

    #[test]
    fn test_missing_ca_file_is_tls_error() {
        let config = ForwardingConfig {
            ca_certificates: vec![PathBuf::from("/nonexistent/atna-ca.pem")],
            ..ForwardingConfig::default()
        };
        let err = config.forward_options().unwrap_err();
        assert!(matches!(err, ConfigError::Tls { .. }));
    }
}
