//! TOML configuration
//!
//! Every section implements `Default`, so a missing or partial file yields
//! the built-in values. Search order used by [`Config::discover`]:
//!
//! 1. an explicit path passed by the caller
//! 2. the `WARMVIEW_CONFIG` environment variable
//! 3. `./warmview.toml`
//! 4. defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::utils::error::ConfigError;

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "WARMVIEW_CONFIG";

/// Default file name looked up in the working directory
pub const CONFIG_FILE: &str = "warmview.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,
    pub pool: PoolConfig,
    pub proxy: ProxyConfig,
    pub bootstrap: BootstrapConfig,
}

/// Log level name passed to `utils::logging::init`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogLevel(pub String);

impl Default for LogLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}

/// Surface pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of idle, pre-built surfaces
    pub capacity: usize,
    /// Consecutive construction failures tolerated during prewarm
    pub prewarm_retry_limit: u32,
    /// Name under which the host bridge is exposed to page scripts
    pub bridge_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 2,
            prewarm_retry_limit: 3,
            bridge_name: "host".to_string(),
        }
    }
}

/// Caching proxy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub enable_cache: bool,
    pub cache_dir: PathBuf,
    /// Upper bound of the on-disk cache in bytes
    pub cache_max_bytes: u64,
    /// `max-age` written into every proxied response
    pub cache_max_age_secs: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_dir: std::env::temp_dir().join("warmview").join("resources"),
            cache_max_bytes: 600 * 1024 * 1024,
            cache_max_age_secs: 31_536_000,
            timeout_secs: 30,
            user_agent: format!("warmview/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }
}

/// Engine bootstrap settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// JSON file holding persisted flags
    pub settings_path: PathBuf,
    pub max_download_retries: u32,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            settings_path: std::env::temp_dir().join("warmview").join("settings.json"),
            max_download_retries: 3,
        }
    }
}

impl Config {
    /// Parse a config from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a config file, failing on unreadable or invalid files
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        info!("configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Locate and load a config file. Never fails: errors fall back to defaults.
    pub fn discover(explicit: Option<&Path>) -> Self {
        let (config, source) = Self::discover_with_source(explicit);
        source.log();
        config
    }

    /// Like [`discover`](Self::discover), but reports where the config came
    /// from instead of logging it, for callers that set up logging from the
    /// result.
    pub fn discover_with_source(explicit: Option<&Path>) -> (Self, ConfigSource) {
        let Some(path) = find_config_path(explicit) else {
            return (Self::default(), ConfigSource::Defaults);
        };
        let loaded = fs::read_to_string(&path)
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })
            .and_then(|content| Self::from_toml(&content));
        match loaded {
            Ok(config) => (config, ConfigSource::File(path)),
            Err(e) => (Self::default(), ConfigSource::Invalid(e)),
        }
    }
}

/// Outcome of config discovery
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    /// No config file was found
    Defaults,
    /// A file was found but could not be used; defaults apply
    Invalid(ConfigError),
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            Self::File(path) => info!("configuration loaded from {}", path.display()),
            Self::Defaults => info!("no config file found, using defaults"),
            Self::Invalid(e) => warn!("{}, using defaults", e),
        }
    }
}

fn find_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        let p = PathBuf::from(path);
        if p.is_file() {
            return Some(p);
        }
    }

    let p = PathBuf::from(CONFIG_FILE);
    if p.is_file() {
        return Some(p);
    }

    None
}
