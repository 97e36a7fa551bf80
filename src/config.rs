//! Application configuration.
//!
//! Read from an optional JSON file. Every field has a default so a missing
//! file, an empty object, or a partial object are all valid.

use crate::platform::Preference;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Tracing filter used when `RUST_LOG` is not set (e.g. "info", "audio_keeper=debug")
    pub log_level: Option<String>,

    pub engine: EngineConfig,

    /// Preferences to start from when the store holds none
    pub preference: Option<Preference>,
}

/// Timing of the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay between deciding to correct and acting, absorbing notification bursts
    pub debounce_ms: u64,

    /// Total write attempts per correction, including the first
    pub max_attempts: u32,

    /// Delay between failed write attempts
    pub retry_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            max_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl EngineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Never less than one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl AppConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}
