//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

const MAX_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `ttl_secs` is 0 or exceeds 30 days
    /// - `timeout_ms` is less than 100ms or exceeds 60 seconds
    /// - table names are empty or identical
    /// - `max_field_bytes` is 0
    /// - `archive_prefix` is empty or contains a path separator
    /// - `redis.port` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_secs == 0 {
            return Err(invalid("ttl_secs", "must be at least 1 second"));
        }
        if self.ttl_secs > MAX_TTL_SECS {
            return Err(invalid("ttl_secs", "must not exceed 30 days (2592000s)"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 60_000 {
            return Err(invalid("timeout_ms", "must not exceed 60 seconds (60000ms)"));
        }

        if self.request_table.is_empty() {
            return Err(invalid("request_table", "must not be empty"));
        }
        if self.dependency_table.is_empty() {
            return Err(invalid("dependency_table", "must not be empty"));
        }
        if self.request_table == self.dependency_table {
            return Err(invalid("dependency_table", "must differ from request_table"));
        }

        if self.max_field_bytes == 0 {
            return Err(invalid("max_field_bytes", "must be greater than 0"));
        }

        if self.archive_prefix.is_empty() {
            return Err(invalid("archive_prefix", "must not be empty"));
        }
        if self.archive_prefix.contains(['/', '\\']) {
            return Err(invalid("archive_prefix", "must not contain path separators"));
        }

        if self.redis.port == 0 {
            return Err(invalid("redis.port", "must be greater than 0"));
        }

        if self.redis.password.is_some() && self.redis.host.is_none() {
            tracing::warn!("redis.password is set without redis.host; request labeling stays disabled");
        }

        Ok(())
    }
}
