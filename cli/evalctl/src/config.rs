//! Configuration management.
//!
//! Handles:
//! - API address and ACL token
//! - Poll loop timings
//!
//! Values come from `config.json` in the platform config directory, then
//! environment variables and flags override them.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use evalwatch_monitor::monitor::{DEFAULT_BLOCKING_WAIT, DEFAULT_POLL_INTERVAL};
use evalwatch_monitor::MonitorConfig;
use serde::{Deserialize, Serialize};

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

/// Address used when nothing else is configured.
pub const DEFAULT_ADDRESS: &str = "http://127.0.0.1:4646";

/// Get the config directory path.
fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("io", "evalwatch", "evalctl")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// API address.
    #[serde(default = "default_address")]
    pub address: String,

    /// ACL token sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Sleep between polls when blocking queries are unavailable.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound for one blocking query.
    #[serde(default = "default_blocking_wait_secs")]
    pub blocking_wait_secs: u64,

    /// Stop monitoring after this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_blocking_wait_secs() -> u64 {
    DEFAULT_BLOCKING_WAIT.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: default_address(),
            token: None,
            poll_interval_secs: default_poll_interval_secs(),
            blocking_wait_secs: default_blocking_wait_secs(),
            timeout_secs: None,
        }
    }
}

/// Values given on the command line (or through their env vars).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub address: Option<String>,
    pub token: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Load config from the platform config directory, or return default.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_dir()?.join(CONFIG_FILE))
    }

    /// Load config from a specific file, or return default if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Apply command-line values on top of the file.
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(address) = overrides.address {
            self.address = address;
        }
        if let Some(token) = overrides.token {
            self.token = Some(token);
        }
        if let Some(secs) = overrides.poll_interval_secs {
            self.poll_interval_secs = secs;
        }
        if let Some(secs) = overrides.timeout_secs {
            self.timeout_secs = Some(secs);
        }
        self
    }

    /// Get the API address without a trailing slash.
    pub fn address(&self) -> &str {
        self.address.trim_end_matches('/')
    }

    /// Token to authenticate with, ignoring empty values.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.is_empty())
    }

    pub fn blocking_wait(&self) -> Duration {
        Duration::from_secs(self.blocking_wait_secs)
    }

    /// Poll loop settings derived from this config.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            blocking_wait: self.blocking_wait(),
            timeout: self
                .timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}
