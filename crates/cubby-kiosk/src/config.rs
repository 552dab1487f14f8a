//! Configuration file support for the kiosk client.
//!
//! Supports loading configuration from TOML files with the following
//! search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./cubby.toml` (current directory)
//! 3. `/etc/cubby/config.toml` (system-wide)
//!
//! A missing file is not an error; every field has a default, and CLI
//! arguments override config file values.

use cubby_core::{
    Error, Result,
    constants::{DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL},
};
use cubby_poll::PollOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    /// Hardware-control backend settings
    pub backend: BackendConfig,
    /// Card polling behavior
    pub polling: PollingConfig,
    /// General application settings
    pub general: GeneralConfig,
}

/// Hardware-control backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Root URL of the hardware-control service.
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
        }
    }
}

/// Card polling behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Tick budget before a polling session gives up.
    pub max_attempts: u32,
    /// Interval between polling ticks, in milliseconds.
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_POLL_ATTEMPTS,
            interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level filter (trace, debug, info, warn, error).
    pub log_level: Option<String>,
}

impl KioskConfig {
    /// Load configuration, trying the explicit path first and falling
    /// back through the search order. Returns defaults when no file is
    /// found.
    ///
    /// # Errors
    /// Returns `Error::Config` when a file exists but cannot be read or
    /// parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        for candidate in [
            Path::new("./cubby.toml"),
            Path::new("/etc/cubby/config.toml"),
        ] {
            if candidate.exists() {
                return Self::from_file(candidate);
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load and parse one specific file.
    ///
    /// # Errors
    /// Returns `Error::Config` on read or parse failure.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {e}", path.display())))?;
        let config: KioskConfig = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("Cannot parse {}: {e}", path.display())))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Polling options derived from this configuration.
    #[must_use]
    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            max_attempts: self.polling.max_attempts,
            interval: Duration::from_millis(self.polling.interval_ms),
        }
    }
}
