//! Configuration loading and resolution
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (handled by the binary)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! A missing TOML file is not an error: it produces a warning and the
//! compiled defaults are used.

use crate::time::millis_to_duration;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "HMX_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Request coordinator settings
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// Remote analysis provider settings
    #[serde(default)]
    pub provider: ProviderSettings,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

/// Request coordinator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Per-attempt deadline in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt when retrying is enabled
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before retry N is `base_delay_ms * 2^(N-1)`
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cache entry lifetime in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Cache capacity; oldest-inserted entries are evicted beyond this
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: usize,

    /// Number of attempt records kept for observability
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Optional JSON file the cache is persisted to
    #[serde(default)]
    pub cache_file: Option<PathBuf>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_cache_entries: default_max_cache_entries(),
            history_capacity: default_history_capacity(),
            cache_file: None,
        }
    }
}

impl AnalysisSettings {
    pub fn timeout(&self) -> Duration {
        millis_to_duration(self.timeout_ms)
    }

    pub fn base_delay(&self) -> Duration {
        millis_to_duration(self.base_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Remote analysis provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Base URL of the analysis service
    #[serde(default = "default_provider_url")]
    pub base_url: String,

    /// Client-side rate limit
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            requests_per_second: default_requests_per_second(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_cache_entries() -> usize {
    500
}

fn default_history_capacity() -> usize {
    100
}

fn default_provider_url() -> String {
    "http://127.0.0.1:5730".to_string()
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

impl TomlConfig {
    /// Apply `HMX_*` environment overrides on top of file values
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("HMX_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(url) = std::env::var("HMX_PROVIDER_URL") {
            self.provider.base_url = url;
        }
        if let Ok(path) = std::env::var("HMX_CACHE_FILE") {
            self.analysis.cache_file = Some(PathBuf::from(path));
        }
        env_number("HMX_TIMEOUT_MS", &mut self.analysis.timeout_ms);
        env_number("HMX_MAX_RETRIES", &mut self.analysis.max_retries);
        env_number("HMX_BASE_DELAY_MS", &mut self.analysis.base_delay_ms);
        env_number("HMX_CACHE_TTL_SECS", &mut self.analysis.cache_ttl_secs);
        env_number("HMX_MAX_CACHE_ENTRIES", &mut self.analysis.max_cache_entries);
        env_number("HMX_REQUESTS_PER_SECOND", &mut self.provider.requests_per_second);
    }
}

fn env_number<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("Ignoring {}={:?}: not a valid number", name, raw),
        }
    }
}

/// Default config file location (`~/.config/hmx/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hmx").join("config.toml"))
}

/// Pick the config file: CLI argument, then `HMX_CONFIG`, then the default
/// location if it exists
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    default_config_path().filter(|p| p.exists())
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load configuration with graceful degradation, then apply env overrides
///
/// A missing or unreadable file logs a warning and falls back to defaults.
pub fn load_config(path: Option<&Path>) -> TomlConfig {
    let mut config = match path {
        Some(path) if path.exists() => match load_toml_config(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("{}; using compiled defaults", e);
                TomlConfig::default()
            }
        },
        Some(path) => {
            warn!("Config file {} not found; using compiled defaults", path.display());
            TomlConfig::default()
        }
        None => TomlConfig::default(),
    };

    config.apply_env_overrides();
    config
}

/// Write config to disk atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
