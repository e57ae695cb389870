//! Configuration management for the DHD bridge
//!
//! Handles loading, parsing, and hot-reloading of the YAML configuration.
//! Loading only parses; validation happens when the bridge is configured so
//! that a bad file is reported as an instance status instead of aborting.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

use crate::transport::ConnectSettings;

pub use watcher::ConfigWatcher;

/// Highest number of generic mirror variables
pub const MAX_GENERIC_ACTIONS: u32 = 100;

/// Invalid configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Host not set")]
    MissingHost,
    #[error("generic_actions_num must be between 1 and 100, got {0}")]
    GenericActionCount(u32),
    #[error("connect_timeout_ms must be greater than 0")]
    ZeroTimeout,
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Device address (`host` or `host:port`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default)]
    pub use_https: bool,
    /// Control API token sent in the `auth` message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Number of `generic-action-{n}` variables
    #[serde(default = "default_generic_actions_num")]
    pub generic_actions_num: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_generic_actions_num() -> u32 {
    10
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: None,
            use_https: false,
            token: None,
            generic_actions_num: default_generic_actions_num(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a YAML file
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Failed to parse YAML config: {}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        // an empty file means "all defaults"
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host().is_none() {
            return Err(ConfigError::MissingHost);
        }
        if self.generic_actions_num == 0 || self.generic_actions_num > MAX_GENERIC_ACTIONS {
            return Err(ConfigError::GenericActionCount(self.generic_actions_num));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Trimmed host, `None` when unset or blank
    pub fn host(&self) -> Option<&str> {
        self.host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }

    pub fn connect_settings(&self) -> Result<ConnectSettings, ConfigError> {
        let host = self.host().ok_or(ConfigError::MissingHost)?;
        Ok(ConnectSettings {
            host: host.to_string(),
            use_https: self.use_https,
            token: self.token.clone().filter(|t| !t.is_empty()),
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Apply command-line / environment overrides
    pub fn with_overrides(mut self, host: Option<&str>, token: Option<&str>) -> Self {
        if let Some(host) = host {
            self.host = Some(host.to_string());
        }
        if let Some(token) = token {
            self.token = Some(token.to_string());
        }
        self
    }
}
