//! Configuration system for the MQTT command-line client
//!
//! Every setting has a default, so the configuration file is optional. Connection
//! targets and credentials are NOT configured here: they arrive through the
//! environment (`MQTT_URL`, `JWT`, `HOME`) and the working directory, see [`crate::auth`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "mqtt-cli.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CliConfig {
    pub reconnect: ReconnectSection,
    pub purge: PurgeSection,
    pub capability: CapabilitySection,
    pub tls: TlsSection,
    pub session: SessionSection,
}

/// Reconnect backoff bounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectSection {
    /// Delay restored after every successful connection
    pub initial_delay_ms: u64,
    /// Upper bound for the doubled delay
    pub max_delay_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 20_000,
        }
    }
}

/// Bulk-clear pacing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PurgeSection {
    /// Pause between two retained-clear publishes
    pub delay_ms: u64,
}

impl Default for PurgeSection {
    fn default() -> Self {
        Self { delay_ms: 50 }
    }
}

/// Local fallback broker used when no explicit URL or token is available
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CapabilitySection {
    pub host: String,
    pub port: u16,
    /// Directory under `$HOME` holding `<package>/password`
    pub credentials_dir: PathBuf,
}

impl Default for CapabilitySection {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            credentials_dir: PathBuf::from(".mqtt-cli"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TlsSection {
    /// Directory holding `client.crt`, `client.key` and `ca.crt`, relative to the working directory
    pub cert_dir: PathBuf,
}

impl Default for TlsSection {
    fn default() -> Self {
        Self {
            cert_dir: PathBuf::from("certs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSection {
    pub keep_alive_secs: u64,
    /// Capacity of the client request queue
    pub channel_capacity: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            keep_alive_secs: 60,
            channel_capacity: 64,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CliConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: CliConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the explicit file if given, else `mqtt-cli.toml` in `working_dir` if it
    /// exists, else defaults
    pub fn load(explicit: Option<&Path>, working_dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        let fallback = working_dir.join(DEFAULT_CONFIG_FILE);
        if fallback.is_file() {
            Self::load_from_file(&fallback)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconnect.initial_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "reconnect.initial_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::InvalidConfig(format!(
                "reconnect.initial_delay_ms ({}) exceeds reconnect.max_delay_ms ({})",
                self.reconnect.initial_delay_ms, self.reconnect.max_delay_ms
            )));
        }
        if self.purge.delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "purge.delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.session.channel_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "session.channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.capability.host.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "capability.host must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn purge_delay(&self) -> Duration {
        Duration::from_millis(self.purge.delay_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.session.keep_alive_secs)
    }
}
