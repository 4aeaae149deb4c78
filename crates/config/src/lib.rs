//! ATNA Collector Configuration
//!
//! TOML configuration with defaults for everything but the endpoints
//! themselves.
//!
//! # Parsing
//!
//! ```
//! use atna_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str(
//!     "[[endpoints]]\nname = \"udp-in\"\naddress = \"udp://0.0.0.0:514\"",
//! )
//! .unwrap();
//! assert_eq!(config.endpoints.len(), 1);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [log]
//! level = "info"
//!
//! [supervisor]
//! max_restarts = 5
//!
//! [forwarding]
//! timeout = "10s"
//!
//! [[endpoints]]
//! name = "syslog-udp"
//! address = "udp://0.0.0.0:514"
//! actions = ["log", "store"]
//! log_path = "/var/log/atna/udp.log"
//!
//! [[endpoints]]
//! name = "syslog-tls"
//! address = "stcp://0.0.0.0:6514"
//! actions = ["store", "forward"]
//! forward = ["tcp://archive.example.org:514"]
//!
//! [endpoints.tls]
//! server_certificate = "/etc/atna/server.pem"
//! server_key = "/etc/atna/server.key"
//! ```

mod endpoints;
mod error;
mod forwarding;
mod logging;
mod supervisor;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use atna_transport::EndpointConfig;
use serde::Deserialize;

pub use endpoints::{
    EndpointSection, KNOWN_ACTIONS, KNOWN_SCHEMES, TlsSection, is_known_action, is_known_scheme,
};
pub use error::{ConfigError, Result};
pub use forwarding::ForwardingConfig;
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use supervisor::SupervisorConfig;
pub use validation::MAX_MESSAGE_SIZE_LIMIT;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collector diagnostics
    pub log: LogConfig,

    /// Transport restart behaviour
    pub supervisor: SupervisorConfig,

    /// Settings shared by all forward actions
    pub forwarding: ForwardingConfig,

    /// Listening endpoints
    pub endpoints: Vec<EndpointSection>,
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Runtime configuration for every endpoint, in file order
    pub fn endpoint_configs(&self) -> Result<Vec<EndpointConfig>> {
        self.endpoints
            .iter()
            .map(EndpointSection::to_endpoint_config)
            .collect()
    }

    /// Endpoint names, in file order
    pub fn endpoint_names(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.name.as_str()).collect()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
