//! Supervisor configuration
//!
//! How listeners react when their transport fails to start.

use std::time::Duration;

use atna_pipeline::{
    DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_RESTARTS, RestartPolicy,
};
use serde::Deserialize;

/// `[supervisor]` section
///
/// # Example
///
/// ```toml
/// [supervisor]
/// restart = true
/// max_restarts = 5        # 0 = give up on the first failure
/// initial_backoff = "1s"
/// max_backoff = "30s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub restart: bool,

    pub max_restarts: u32,

    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart: true,
            max_restarts: DEFAULT_MAX_RESTARTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl SupervisorConfig {
    pub fn restart_policy(&self) -> RestartPolicy {
        let policy = RestartPolicy::default()
            .with_max_restarts(self.max_restarts)
            .with_backoff(self.initial_backoff, self.max_backoff);

        if self.restart {
            policy
        } else {
            RestartPolicy {
                enabled: false,
                ..policy
            }
        }
    }
}
