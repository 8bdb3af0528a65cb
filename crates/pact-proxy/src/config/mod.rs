//! Configuration types for pact-proxy.

mod pool;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::notify::RetryPolicy;

pub use pool::ConnectionPoolConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub wait: WaitConfig,
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
}

/// Listener for the admin API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_host")]
    pub host: String,
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            host: default_admin_host(),
            port: default_admin_port(),
        }
    }
}

fn default_admin_host() -> String {
    "0.0.0.0".to_string()
}

fn default_admin_port() -> u16 {
    8080
}

/// Bounds for wait-for-interaction requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WaitConfig {
    /// Poll floor between predicate checks
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Overall ceiling; per-request timeouts are clamped to this
    #[serde(default = "default_wait_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_wait_timeout_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_wait_timeout_ms() -> u64 {
    15_000
}

impl WaitConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, anyhow::Error> {
        let settings: Settings = serde_yaml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.admin.port == 0 {
            anyhow::bail!("admin.port must be non-zero");
        }

        if self.wait.poll_interval_ms == 0 {
            anyhow::bail!("wait.poll_interval_ms must be greater than 0");
        }

        if self.wait.timeout_ms < self.wait.poll_interval_ms {
            anyhow::bail!(
                "wait.timeout_ms ({}) must be at least wait.poll_interval_ms ({})",
                self.wait.timeout_ms,
                self.wait.poll_interval_ms
            );
        }

        self.connection_pool.validate()?;
        Ok(())
    }
}
