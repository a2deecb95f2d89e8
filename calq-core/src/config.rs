//! Configuration loading and management
//!
//! Library users normally build [`ClientOptions`] in code. The CLI (and any
//! host that prefers a file) loads a [`Config`] from
//! `~/.config/calq/config.toml`.
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/calq/` (~/.config/calq/)
//! - State/Logs: `$XDG_STATE_HOME/calq/` (~/.local/state/calq/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Minimum length of a valid write key
pub const MIN_WRITE_KEY_LEN: usize = 32;

/// Environment variable overriding the configured write key
pub const WRITE_KEY_ENV: &str = "CALQ_WRITE_KEY";

/// Longest accepted cookie lifetime (100 years)
pub const MAX_COOKIE_EXPIRES_DAYS: i64 = 36_500;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Project write key (at least 32 characters)
    #[serde(default)]
    pub write_key: Option<String>,

    /// API server and delivery queue settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Session cookie settings
    #[serde(default)]
    pub cookie: CookieConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Options accepted when constructing a client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientOptions {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub cookie: CookieConfig,
}

/// API server and delivery queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API server hostname (no scheme)
    #[serde(default = "default_api_host")]
    pub host: String,

    /// Use HTTPS instead of HTTP
    #[serde(default)]
    pub use_secure: bool,

    /// Queue length that forces a flush
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Max retries per call (connection failures only)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Total request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            use_secure: false,
            max_queue_size: default_max_queue_size(),
            max_retries: default_max_retries(),
            connect_timeout_secs: default_connect_timeout(),
            timeout_secs: default_timeout(),
        }
    }
}

impl ApiConfig {
    /// URL scheme used for API calls
    pub fn scheme(&self) -> &'static str {
        if self.use_secure {
            "https"
        } else {
            "http"
        }
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("api.host must not be empty".to_string()));
        }
        if self.host.contains("://") {
            return Err(Error::Config(
                "api.host must be a hostname without a scheme".to_string(),
            ));
        }
        if self.max_queue_size == 0 {
            return Err(Error::Config(
                "api.max_queue_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_api_host() -> String {
    "api.calq.io".to_string()
}

fn default_max_queue_size() -> usize {
    100
}

fn default_max_retries() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_timeout() -> u64 {
    15
}

/// Session cookie configuration
///
/// The name must match the one used by the browser library for the two to
/// share state.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    #[serde(default = "default_cookie_name")]
    pub name: String,

    /// Cookie domain; host-only when unset
    #[serde(default)]
    pub domain: Option<String>,

    /// Lifetime in days
    #[serde(default = "default_cookie_expires_days")]
    pub expires_days: i64,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: default_cookie_name(),
            domain: None,
            expires_days: default_cookie_expires_days(),
        }
    }
}

impl CookieConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("cookie.name must not be empty".to_string()));
        }
        if !(0..=MAX_COOKIE_EXPIRES_DAYS).contains(&self.expires_days) {
            return Err(Error::Config(format!(
                "cookie.expires_days must be between 0 and {}",
                MAX_COOKIE_EXPIRES_DAYS
            )));
        }
        Ok(())
    }
}

fn default_cookie_name() -> String {
    "_calq_d".to_string()
}

fn default_cookie_expires_days() -> i64 {
    180
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Check a write key, returning an error if it is too short to be valid
pub fn validate_write_key(write_key: &str) -> Result<()> {
    if write_key.len() < MIN_WRITE_KEY_LEN {
        return Err(Error::Validation(format!(
            "a valid write key must be specified (at least {} characters)",
            MIN_WRITE_KEY_LEN
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from the default path
    ///
    /// `CALQ_WRITE_KEY` overrides any write key in the file.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        if let Ok(write_key) = std::env::var(WRITE_KEY_ENV) {
            config.write_key = Some(write_key);
        }

        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        match &self.write_key {
            Some(key) => validate_write_key(key)?,
            None => return Err(Error::Config("write_key is required".to_string())),
        }
        self.api.validate()?;
        self.cookie.validate()
    }

    /// Client options derived from this configuration
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            api: self.api.clone(),
            cookie: self.cookie.clone(),
        }
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/calq/config.toml` (~/.config/calq/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("calq").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/calq/` (~/.local/state/calq/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("calq")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join(crate::logging::LOG_FILE_NAME)
    }
}
