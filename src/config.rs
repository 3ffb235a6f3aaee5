//! Configuration file parser for `feedcord.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos. Secrets may also come from the environment
//! (`DISCORD_TOKEN`, `FEEDCORD_API_KEY`), which wins over the file.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::discord::{ChannelCache, DEFAULT_API_BASE};
use crate::feed::{FetchOptions, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_FEED_SIZE};
use crate::scheduler::DEFAULT_TICK_INTERVAL;
use crate::storage::MIN_INTERVAL_MS;

/// Environment variable holding the bot token
pub const TOKEN_ENV: &str = "DISCORD_TOKEN";
/// Environment variable holding the management API key
pub const API_KEY_ENV: &str = "FEEDCORD_API_KEY";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("No Discord bot token: set {env} or discord_token in the config file", env = TOKEN_ENV)]
    MissingToken,
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Service configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// The custom Debug impl masks both secrets.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file.
    pub database_path: String,

    /// Address the management API listens on.
    pub bind_address: String,

    /// Discord REST base URL.
    pub discord_api_base: String,

    /// Seconds between scheduler ticks.
    pub tick_interval_secs: u64,

    /// Upper bound on one feed fetch, in seconds.
    pub fetch_timeout_secs: u64,

    /// Largest accepted feed document, in bytes.
    pub max_feed_bytes: usize,

    /// Polling interval for subscriptions added without one.
    pub default_interval_ms: i64,

    /// Number of channels whose type is remembered.
    pub channel_cache_capacity: usize,

    /// Bot token (alternative to DISCORD_TOKEN env var).
    pub discord_token: Option<String>,

    /// Shared secret for the management API (alternative to FEEDCORD_API_KEY).
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "feedcord.db".to_string(),
            bind_address: "127.0.0.1:3000".to_string(),
            discord_api_base: DEFAULT_API_BASE.to_string(),
            tick_interval_secs: DEFAULT_TICK_INTERVAL.as_secs(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            max_feed_bytes: DEFAULT_MAX_FEED_SIZE,
            default_interval_ms: MIN_INTERVAL_MS,
            channel_cache_capacity: ChannelCache::DEFAULT_CAPACITY,
            discord_token: None,
            api_key: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("bind_address", &self.bind_address)
            .field("discord_api_base", &self.discord_api_base)
            .field("tick_interval_secs", &self.tick_interval_secs)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("max_feed_bytes", &self.max_feed_bytes)
            .field("default_interval_ms", &self.default_interval_ms)
            .field("channel_cache_capacity", &self.channel_cache_capacity)
            .field(
                "discord_token",
                &self.discord_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

const KNOWN_KEYS: [&str; 10] = [
    "database_path",
    "bind_address",
    "discord_api_base",
    "tick_interval_secs",
    "fetch_timeout_secs",
    "max_feed_bytes",
    "default_interval_ms",
    "channel_cache_capacity",
    "discord_token",
    "api_key",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            database = %config.database_path,
            bind = %config.bind_address,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Overrides secrets from the process environment.
    pub fn with_env(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Overrides secrets from `lookup`; empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty(TOKEN_ENV) {
            self.discord_token = Some(token);
        }
        if let Some(key) = non_empty(API_KEY_ENV) {
            self.api_key = Some(key);
        }
        self
    }

    /// The bot token, required to start.
    pub fn discord_token(&self) -> Result<SecretString, ConfigError> {
        self.discord_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| SecretString::from(t.to_string()))
            .ok_or(ConfigError::MissingToken)
    }

    /// The management API key, if the API is gated.
    pub fn api_key(&self) -> Option<SecretString> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(|k| SecretString::from(k.to_string()))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
            max_bytes: self.max_feed_bytes,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
