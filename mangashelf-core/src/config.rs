//! mangashelf configuration
//!
//! ## Configuration Sources (in precedence order)
//!
//! 1. Explicit path (CLI `--config`)
//! 2. `MANGASHELF_CONFIG` environment variable
//! 3. `config.yaml` in the platform config directory
//! 4. Built-in defaults
//!
//! Every field is optional in the file:
//!
//! ```yaml
//! api_base_url: https://api.comick.fun
//! timeout_seconds: 15
//! cache:
//!   stale_after_secs: 60
//!   expire_after_secs: 86400
//!   retries: 2
//! persistence:
//!   buster: v1
//!   debounce_ms: 1000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::persist::PersistOptions;
use crate::cache::CachePolicy;

/// Default Comick API origin
pub const DEFAULT_API_BASE_URL: &str = "https://api.comick.fun";

/// Default image host used for storage-key URLs
pub const DEFAULT_IMAGE_BASE_URL: &str = "https://meo.comick.pictures/";

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "MANGASHELF_CONFIG";

/// Current cache-format version; snapshots tagged differently are discarded
pub const DEFAULT_BUSTER: &str = "v1";

const MIN_TIMEOUT_SECONDS: u64 = 1;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("Could not determine a data directory for the cache database")]
    NoDataDir,
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfConfig {
    /// Origin for all catalog API calls
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Host prefixed to image storage keys
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,

    /// HTTP timeout per request
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Override for the User-Agent header
    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Query cache timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Age after which an entry is stale and gets refetched on read
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Age after which an entry is discarded
    #[serde(default = "default_expire_after")]
    pub expire_after_secs: u64,

    /// Extra attempts after a failed fetch
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base delay between attempts, doubled each time
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

/// Snapshot persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// SQLite file; defaults to `mangashelf.db` in the platform data dir
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default = "default_buster")]
    pub buster: String,

    /// Snapshots older than this are ignored at startup
    #[serde(default = "default_expire_after")]
    pub max_age_secs: u64,

    /// Quiet period before a changed cache is written out
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_image_base_url() -> String {
    DEFAULT_IMAGE_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    15
}

fn default_stale_after() -> u64 {
    60
}

fn default_expire_after() -> u64 {
    24 * 60 * 60
}

fn default_retries() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_buster() -> String {
    DEFAULT_BUSTER.to_string()
}

fn default_debounce() -> u64 {
    1000
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            image_base_url: default_image_base_url(),
            timeout_seconds: default_timeout(),
            user_agent: None,
            cache: CacheConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after(),
            expire_after_secs: default_expire_after(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: None,
            buster: default_buster(),
            max_age_secs: default_expire_after(),
            debounce_ms: default_debounce(),
        }
    }
}

impl ShelfConfig {
    /// Resolve configuration using the documented precedence
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                debug!("Using config from {}={}", CONFIG_ENV_VAR, path);
                return Self::load_from_path(Path::new(&path));
            }
        }

        match Self::default_config_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml_ng::Error> {
        // An empty file deserializes to unit, not to a mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(content)
    }

    /// `config.yaml` in the platform config directory
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// SQLite database path, creating its parent directory if needed
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        let path = match &self.persistence.database_path {
            Some(path) => path.clone(),
            None => project_dirs()
                .map(|dirs| dirs.data_dir().join("mangashelf.db"))
                .ok_or(ConfigError::NoDataDir)?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| ConfigError::Read {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        Ok(path)
    }

    /// Request timeout, clamped to a sane minimum
    pub fn timeout(&self) -> Duration {
        if self.timeout_seconds < MIN_TIMEOUT_SECONDS {
            warn!(
                "Configured timeout_seconds={} is too low; using minimum of {} seconds",
                self.timeout_seconds, MIN_TIMEOUT_SECONDS
            );
            return Duration::from_secs(MIN_TIMEOUT_SECONDS);
        }
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| concat!("mangashelf/", env!("CARGO_PKG_VERSION")).to_string())
    }
}

impl CacheConfig {
    pub fn policy(&self) -> CachePolicy {
        CachePolicy {
            stale_after: Duration::from_secs(self.stale_after_secs),
            expire_after: Duration::from_secs(self.expire_after_secs),
            retries: self.retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

impl PersistenceConfig {
    pub fn options(&self) -> PersistOptions {
        PersistOptions {
            buster: self.buster.clone(),
            max_age: Duration::from_secs(self.max_age_secs),
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("io", "mangashelf", "mangashelf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ShelfConfig::default();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.cache.stale_after_secs, 60);
        assert_eq!(config.cache.expire_after_secs, 86_400);
        assert_eq!(config.cache.retries, 2);
        assert_eq!(config.persistence.buster, "v1");
        assert!(config.persistence.enabled);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ShelfConfig::from_yaml("cache:\n  stale_after_secs: 5\n").unwrap();
        assert_eq!(config.cache.stale_after_secs, 5);
        assert_eq!(config.cache.expire_after_secs, 86_400);
        assert_eq!(config.timeout_seconds, 15);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(ShelfConfig::from_yaml("   \n").unwrap(), ShelfConfig::default());
    }

    #[test]
    fn test_timeout_is_clamped() {
        let config = ShelfConfig {
            timeout_seconds: 0,
            ..Default::default()
        };
        assert_eq!(config.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_policy_conversion() {
        let policy = CacheConfig {
            stale_after_secs: 10,
            expire_after_secs: 100,
            retries: 0,
            retry_delay_ms: 5,
        }
        .policy();
        assert_eq!(policy.stale_after, Duration::from_secs(10));
        assert_eq!(policy.expire_after, Duration::from_secs(100));
        assert_eq!(policy.retry_delay, Duration::from_millis(5));
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = ShelfConfig::load(Some(&temp_dir.path().join("nope.yaml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "cache: [not, a, map]").unwrap();
        let result = ShelfConfig::load_from_path(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    #[serial]
    fn test_env_var_path_is_used() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("env.yaml");
        std::fs::write(&path, "timeout_seconds: 42\n").unwrap();

        std::env::set_var(CONFIG_ENV_VAR, &path);
        let config = ShelfConfig::load(None);
        std::env::remove_var(CONFIG_ENV_VAR);

        assert_eq!(config.unwrap().timeout_seconds, 42);
    }

    #[test]
    #[serial]
    fn test_explicit_path_beats_env_var() {
        let temp_dir = TempDir::new().unwrap();
        let env_path = temp_dir.path().join("env.yaml");
        let explicit_path = temp_dir.path().join("explicit.yaml");
        std::fs::write(&env_path, "timeout_seconds: 42\n").unwrap();
        std::fs::write(&explicit_path, "timeout_seconds: 7\n").unwrap();

        std::env::set_var(CONFIG_ENV_VAR, &env_path);
        let config = ShelfConfig::load(Some(&explicit_path));
        std::env::remove_var(CONFIG_ENV_VAR);

        assert_eq!(config.unwrap().timeout_seconds, 7);
    }

    #[test]
    fn test_database_path_creates_parent() {
        let temp_dir = TempDir::new().unwrap();
        let db = temp_dir.path().join("nested/dir/shelf.db");
        let config = ShelfConfig {
            persistence: PersistenceConfig {
                database_path: Some(db.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(config.database_path().unwrap(), db);
        assert!(temp_dir.path().join("nested/dir").is_dir());
    }
}
