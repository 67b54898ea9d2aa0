//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the havvarsel.toml file.
//! It covers the sampled location, the API endpoint and client settings, and the
//! polling cadence used by the binary's refresh loop.
//!
//! The library core never reads this file itself: the binary turns it into the
//! plain values [`crate::poller::Poller`] and [`crate::transport::HttpTransport`]
//! take.

use crate::poller::Location;
use crate::transport::{DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "havvarsel.toml";

/// Application configuration loaded from havvarsel.toml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Sampled point and depth
    pub location: LocationConfig,
    /// Upstream API settings
    pub api: ApiConfig,
    /// Refresh cadence and requested variables
    pub polling: PollingConfig,
}

/// Where to sample
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Human-readable name for logs and summaries
    pub name: String,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Depth in meters below the surface
    pub depth: u32,
}

/// Upstream API settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Root of the Havvarsel v2 API
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Client identifier sent as User-Agent
    pub user_agent: String,
}

/// Refresh cadence
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between refreshes
    pub interval_secs: u64,
    /// Variables to request; temperature is always added
    pub variables: Vec<String>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        LocationConfig {
            name: "Bergen, Nordnes".to_string(),
            longitude: 5.303883,
            latitude: 60.400485,
            depth: 0,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        PollingConfig {
            interval_secs: 600, // 10 minutes
            variables: vec!["temperature".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from havvarsel.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(location = %config.location.name, "loaded configuration");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid config file format, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save current configuration to the specified path
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), contents)?;
        info!(path = %path.as_ref().display(), "configuration saved");
        Ok(())
    }

    pub fn location(&self) -> Location {
        Location {
            longitude: self.location.longitude,
            latitude: self.location.latitude,
            depth: self.location.depth,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Poll interval, never shorter than one second
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_secs.max(1))
    }
}
