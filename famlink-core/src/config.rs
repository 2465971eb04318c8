//! Configuration loading for the coordination core.
//!
//! Configuration is loaded from a TOML file (default: `famlink.toml`).
//! Every field has a default, so a missing or partial file still yields a
//! working core. All windows and intervals are tunable without protocol
//! changes.

use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration for the coordination core.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CoreConfig {
    /// Pairing code issuance and sweeping.
    #[serde(default)]
    pub pairing: PairingConfig,
    /// Heartbeat polling and staleness.
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Typing lease debounce and sweeping.
    #[serde(default)]
    pub typing: TypingConfig,
    /// Transient-failure retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Pairing code configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PairingConfig {
    /// Code lifetime in seconds (default: 600 = 10 minutes).
    #[serde(default = "default_code_ttl_secs")]
    pub code_ttl_secs: u64,
    /// Code length in characters, 6-8 (default: 6).
    #[serde(default = "default_code_length")]
    pub code_length: usize,
    /// Generation attempts before giving up on a unique code (default: 5).
    #[serde(default = "default_max_issue_attempts")]
    pub max_issue_attempts: u32,
    /// Expired-code sweep interval in seconds (default: 60).
    #[serde(default = "default_code_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Presence tracking configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// Scheduled poll interval in seconds (default: 30).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Heartbeat age in seconds past which a device is offline
    /// (default: 90).
    #[serde(default = "default_offline_threshold_secs")]
    pub offline_threshold_secs: u64,
}

/// Typing lease configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TypingConfig {
    /// Lease lifetime without renewal in milliseconds (default: 2000).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Expired-lease sweep interval in milliseconds (default: 250).
    #[serde(default = "default_typing_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

/// Retry policy configuration for transient store failures.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay in milliseconds, doubled per attempt (default: 50).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap on the computed delay in milliseconds (default: 2000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

// Default value functions
fn default_code_ttl_secs() -> u64 {
    600 // 10 minutes
}

fn default_code_length() -> usize {
    6
}

fn default_max_issue_attempts() -> u32 {
    5
}

fn default_code_sweep_interval_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_offline_threshold_secs() -> u64 {
    90
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_typing_sweep_interval_ms() -> u64 {
    250
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    2000
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: default_code_ttl_secs(),
            code_length: default_code_length(),
            max_issue_attempts: default_max_issue_attempts(),
            sweep_interval_secs: default_code_sweep_interval_secs(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            offline_threshold_secs: default_offline_threshold_secs(),
        }
    }
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            sweep_interval_ms: default_typing_sweep_interval_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
