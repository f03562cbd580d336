//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TRACELABEL_*)
//! 2. TOML config file (if TRACELABEL_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Which shared store implementation backs the tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Sqlite,
}

/// Connection settings for the Redis backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    /// Set via TRACELABEL_REDIS__HOST. When unset, instrumentation is skipped.
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_redis_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Logical database index selected after connecting.
    #[serde(default)]
    pub db: i64,

    /// Connect over TLS (`rediss://`).
    #[serde(default)]
    pub secure: bool,
}

fn default_redis_port() -> u16 {
    6379
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self { host: None, port: default_redis_port(), username: None, password: None, db: 0, secure: false }
    }
}

/// Names of the two logical tables inside the shared store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreTables {
    pub requests: String,
    pub dependencies: String,
}

impl Default for StoreTables {
    fn default() -> Self {
        Self { requests: default_request_table(), dependencies: default_dependency_table() }
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TRACELABEL_*)
/// 2. TOML config file (if TRACELABEL_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Set via TRACELABEL_BACKEND (`redis` or `sqlite`).
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Nested keys are set via TRACELABEL_REDIS__HOST, TRACELABEL_REDIS__PORT, ...
    #[serde(default)]
    pub redis: RedisSettings,

    /// Path to the SQLite store database.
    ///
    /// Set via TRACELABEL_SQLITE_PATH environment variable.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    /// Table time-to-live in seconds, refreshed on every write.
    ///
    /// Set via TRACELABEL_TTL_SECS environment variable.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Connect/read timeout for store calls in milliseconds.
    ///
    /// Set via TRACELABEL_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_request_table")]
    pub request_table: String,

    #[serde(default = "default_dependency_table")]
    pub dependency_table: String,

    /// Body fields longer than this are replaced with a placeholder.
    ///
    /// Set via TRACELABEL_MAX_FIELD_BYTES environment variable.
    #[serde(default = "default_max_field_bytes")]
    pub max_field_bytes: usize,

    /// Directory receiving the daily archive files.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// Daily archive file prefix. Set `blackfire_` to keep the file names
    /// older tooling expects.
    #[serde(default = "default_archive_prefix")]
    pub archive_prefix: String,

    /// Also write a JSON-lines sibling next to each text archive.
    #[serde(default)]
    pub structured_archive: bool,
}

fn default_backend() -> StoreBackend {
    StoreBackend::Redis
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./tracelabel-store.sqlite")
}

fn default_ttl_secs() -> u64 {
    100_800 // 28 hours
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_request_table() -> String {
    "request_logs".into()
}

fn default_dependency_table() -> String {
    "included_files".into()
}

fn default_max_field_bytes() -> usize {
    1024
}

fn default_archive_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_archive_prefix() -> String {
    "requests_".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            redis: RedisSettings::default(),
            sqlite_path: default_sqlite_path(),
            ttl_secs: default_ttl_secs(),
            timeout_ms: default_timeout_ms(),
            request_table: default_request_table(),
            dependency_table: default_dependency_table(),
            max_field_bytes: default_max_field_bytes(),
            archive_dir: default_archive_dir(),
            archive_prefix: default_archive_prefix(),
            structured_archive: false,
        }
    }
}

impl AppConfig {
    /// Store call timeout as Duration for use with tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Table time-to-live as Duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn tables(&self) -> StoreTables {
        StoreTables { requests: self.request_table.clone(), dependencies: self.dependency_table.clone() }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TRACELABEL_`
    /// 2. TOML file from `TRACELABEL_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TRACELABEL_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TRACELABEL_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Redis host, when the Redis backend has been configured at all.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no host is set.
    pub fn require_redis_host(&self) -> Result<&str, ConfigError> {
        self.redis.host.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "redis.host".into(),
            hint: "Set TRACELABEL_REDIS__HOST environment variable".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.backend, StoreBackend::Redis);
        assert_eq!(config.sqlite_path, PathBuf::from("./tracelabel-store.sqlite"));
        assert_eq!(config.ttl_secs, 100_800);
        assert_eq!(config.timeout_ms, 5_000);
        assert_eq!(config.request_table, "request_logs");
        assert_eq!(config.dependency_table, "included_files");
        assert_eq!(config.max_field_bytes, 1024);
        assert_eq!(config.archive_prefix, "requests_");
        assert!(!config.structured_archive);
        assert_eq!(config.redis.port, 6379);
        assert!(config.redis.host.is_none());
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(5_000));
        assert_eq!(config.ttl(), Duration::from_secs(28 * 60 * 60));
    }

    #[test]
    fn test_tables() {
        let config = AppConfig { request_table: "req".into(), ..Default::default() };
        let tables = config.tables();
        assert_eq!(tables.requests, "req");
        assert_eq!(tables.dependencies, "included_files");
    }

    #[test]
    fn test_require_redis_host_missing() {
        let config = AppConfig::default();
        let result = config.require_redis_host();
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_load_from_env_and_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("tracelabel.toml", "ttl_secs = 3600\nbackend = \"sqlite\"\n")?;
            jail.set_env("TRACELABEL_CONFIG_FILE", "tracelabel.toml");
            jail.set_env("TRACELABEL_TTL_SECS", "7200");
            jail.set_env("TRACELABEL_REDIS__HOST", "cache.internal");
            jail.set_env("TRACELABEL_REDIS__PORT", "6380");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.backend, StoreBackend::Sqlite);
            assert_eq!(config.ttl_secs, 7200);
            assert_eq!(config.redis.host.as_deref(), Some("cache.internal"));
            assert_eq!(config.redis.port, 6380);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TRACELABEL_TTL_SECS", "0");
            let result = AppConfig::load();
            assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "ttl_secs"));
            Ok(())
        });
    }

    #[test]
    fn test_archive_prefix_from_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TRACELABEL_ARCHIVE_PREFIX", "blackfire_");
            jail.set_env("TRACELABEL_ARCHIVE_DIR", "/var/log/app");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 9).ok_or_else(|| "bad date".to_string())?;
            assert_eq!(
                crate::archive::daily_archive_path(&config.archive_dir, &config.archive_prefix, date),
                PathBuf::from("/var/log/app/blackfire_2024-03-09.log")
            );
            Ok(())
        });
    }
}
