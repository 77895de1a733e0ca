//! # Engine Configuration
//!
//! Configuration management for the reconciliation engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_WRITE_DEADLINE_SECS=5                                        │
//! │     TALLY_ROW_CAP=1000                                                 │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally/engine.toml (Linux)                                │
//! │     ~/Library/Application Support/com.tally.ledger/engine.toml (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     10s write deadline, 5000-row cap                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # engine.toml
//! [write]
//! deadline_secs = 10
//!
//! [listener]
//! initial_backoff_ms = 500
//! max_backoff_secs = 60
//! row_cap = 5000
//!
//! [channels]
//! event_capacity = 256
//! command_capacity = 64
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Write Settings
// =============================================================================

/// Settings for the write path (optimistic local + remote under deadline).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteSettings {
    /// Deadline for a remote write or delete (seconds). When exceeded, the
    /// caller gets a timeout error but the operation is not cancelled.
    #[serde(default = "default_write_deadline")]
    pub deadline_secs: u64,
}

fn default_write_deadline() -> u64 {
    10
}

impl Default for WriteSettings {
    fn default() -> Self {
        WriteSettings {
            deadline_secs: default_write_deadline(),
        }
    }
}

impl WriteSettings {
    /// Returns the deadline as a Duration.
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

// =============================================================================
// Listener Settings
// =============================================================================

/// Settings for remote snapshot listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerSettings {
    /// Initial backoff duration (milliseconds) for resubscription after a
    /// transport failure.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (seconds) for resubscription.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Default row cap per snapshot, applied when a collection spec does
    /// not carry its own.
    #[serde(default = "default_row_cap")]
    pub row_cap: usize,
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    60
}

fn default_row_cap() -> usize {
    tally_core::DEFAULT_ROW_CAP
}

impl Default for ListenerSettings {
    fn default() -> Self {
        ListenerSettings {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            row_cap: default_row_cap(),
        }
    }
}

impl ListenerSettings {
    /// Returns the initial backoff as a Duration.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Returns the maximum backoff as a Duration.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// Channel Settings
// =============================================================================

/// Internal channel capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Capacity of the listener → engine event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Capacity of the handle → engine command channel.
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

fn default_event_capacity() -> usize {
    256
}

fn default_command_capacity() -> usize {
    64
}

impl Default for ChannelSettings {
    fn default() -> Self {
        ChannelSettings {
            event_capacity: default_event_capacity(),
            command_capacity: default_command_capacity(),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
///
/// ## Example Config File
/// ```toml
/// [write]
/// deadline_secs = 10
///
/// [listener]
/// initial_backoff_ms = 500
/// max_backoff_secs = 60
/// row_cap = 5000
///
/// [channels]
/// event_capacity = 256
/// command_capacity = 64
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Write-path settings.
    #[serde(default)]
    pub write: WriteSettings,

    /// Snapshot listener settings.
    #[serde(default)]
    pub listener: ListenerSettings,

    /// Internal channel capacities.
    #[serde(default)]
    pub channels: ChannelSettings,
}

impl EngineConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        // Try to load from config file
        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        // Override with environment variables
        config.apply_env_overrides();

        // Validate the configuration
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.write.deadline_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "write.deadline_secs must be greater than 0".into(),
            ));
        }

        if self.listener.row_cap == 0 {
            return Err(EngineError::InvalidConfig(
                "listener.row_cap must be greater than 0".into(),
            ));
        }

        if self.channels.event_capacity == 0 || self.channels.command_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "channel capacities must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // Write deadline
        if let Ok(secs) = std::env::var("TALLY_WRITE_DEADLINE_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                debug!(deadline_secs = s, "Overriding write deadline from environment");
                self.write.deadline_secs = s;
            }
        }

        // Listener backoff
        if let Ok(ms) = std::env::var("TALLY_INITIAL_BACKOFF_MS") {
            if let Ok(v) = ms.parse::<u64>() {
                self.listener.initial_backoff_ms = v;
            }
        }

        if let Ok(secs) = std::env::var("TALLY_MAX_BACKOFF_SECS") {
            if let Ok(v) = secs.parse::<u64>() {
                self.listener.max_backoff_secs = v;
            }
        }

        // Row cap
        if let Ok(cap) = std::env::var("TALLY_ROW_CAP") {
            if let Ok(v) = cap.parse::<usize>() {
                debug!(row_cap = v, "Overriding row cap from environment");
                self.listener.row_cap = v;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "ledger").map(|dirs| {
            let config_dir = dirs.config_dir();
            config_dir.join("engine.toml")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.write.deadline_secs, 10);
        assert_eq!(config.listener.row_cap, tally_core::DEFAULT_ROW_CAP);
        assert_eq!(config.channels.event_capacity, 256);
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());

        // Zero deadline should fail
        config.write.deadline_secs = 0;
        assert!(config.validate().is_err());

        // Zero row cap should fail
        config.write.deadline_secs = 10;
        config.listener.row_cap = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_accessors() {
        let config = EngineConfig::default();
        assert_eq!(config.write.deadline(), Duration::from_secs(10));
        assert_eq!(config.listener.initial_backoff(), Duration::from_millis(500));
        assert_eq!(config.listener.max_backoff(), Duration::from_secs(60));
    }

    #[test]
    fn test_toml_serialization() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[write]"));
        assert!(toml_str.contains("[listener]"));

        let back: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.write.deadline_secs, config.write.deadline_secs);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str("[write]\ndeadline_secs = 5\n").unwrap();
        assert_eq!(config.write.deadline_secs, 5);
        assert_eq!(config.listener.row_cap, tally_core::DEFAULT_ROW_CAP);
    }
}
