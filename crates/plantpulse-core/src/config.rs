//! Gateway configuration.
//!
//! Configuration is resolved at startup from three layers, later layers
//! winning: built-in defaults (which reproduce the reference cement-plant
//! deployment), an optional JSON config file, and individual environment
//! variable overrides.

use crate::model::Tag;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the JSON config file to load.
pub const CONFIG_PATH_ENV: &str = "PLANTPULSE_CONFIG";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Address the HTTP/WebSocket surface binds to.
    pub listen_addr: SocketAddr,

    /// Endpoint URL of the industrial data source.
    pub source_url: String,

    /// Seconds between poll rounds.
    pub poll_interval_secs: u64,

    /// Hours a session token stays valid after login.
    pub token_lifetime_hours: u64,

    /// The tag table: every process variable the gateway serves.
    pub tags: Vec<Tag>,

    /// Username -> secret table backing the static credential store.
    pub users: HashMap<String, String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".parse().unwrap(),
            source_url: "opc.tcp://127.0.0.1:4840/freeopcua/server/".to_string(),
            poll_interval_secs: 2,
            token_lifetime_hours: 24,
            tags: default_tags(),
            users: HashMap::from([("user".to_string(), "password123".to_string())]),
        }
    }
}

/// The reference deployment's tag table: four kiln-line process variables.
pub fn default_tags() -> Vec<Tag> {
    vec![
        Tag::new("PREHEATER_EXIT_TEMP", "ns=2;i=20", "°C").with_range(1440.0, 1465.0),
        Tag::new("KILN_FEED_END_TEMP", "ns=2;i=21", "°C").with_range(98.0, 103.5),
        Tag::new("COOLER_EXIT_TEMP", "ns=2;i=22", "°C").with_range(99.0, 105.0),
        Tag::new("CLINKER_TONS_PER_HOUR", "ns=2;i=23", "t/h").with_range(198.0, 203.0),
    ]
}

impl GatewayConfig {
    /// Resolve configuration: defaults, then the file named by
    /// `PLANTPULSE_CONFIG` (if set), then environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a JSON file, falling back to defaults for
    /// absent fields.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Interval between poll rounds.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Session token lifetime.
    pub fn token_lifetime(&self) -> Duration {
        Duration::from_secs(self.token_lifetime_hours * 3600)
    }

    /// Age past which a cached value is flagged stale: twice the poll
    /// interval, so one missed round is tolerated before dashboards see
    /// the flag.
    pub fn stale_after(&self) -> Duration {
        2 * self.poll_interval()
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(addr) = std::env::var("PLANTPULSE_LISTEN_ADDR") {
            self.listen_addr = addr.parse().map_err(|_| ConfigError::Invalid {
                key: "PLANTPULSE_LISTEN_ADDR".to_string(),
                message: format!("not a socket address: {addr}"),
            })?;
        }
        if let Ok(url) = std::env::var("PLANTPULSE_SOURCE_URL") {
            self.source_url = url;
        }
        if let Ok(secs) = std::env::var("PLANTPULSE_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_env("PLANTPULSE_POLL_INTERVAL_SECS", &secs)?;
        }
        if let Ok(hours) = std::env::var("PLANTPULSE_TOKEN_LIFETIME_HOURS") {
            self.token_lifetime_hours = parse_env("PLANTPULSE_TOKEN_LIFETIME_HOURS", &hours)?;
        }
        Ok(())
    }
}

fn parse_env(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        message: format!("not a number: {value}"),
    })
}
