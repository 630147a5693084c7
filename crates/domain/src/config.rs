//! Configuration management

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_KEYCHAIN_SERVICE,
    DEFAULT_LOOKAHEAD_DAYS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_MS,
    DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_MAX_EVENT_SPAN_DAYS, DEFAULT_SYNC_INTERVAL_SECS,
};
use crate::errors::{CareSyncError, Result};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub keychain: KeychainConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

/// Sync configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    /// Terminal pass failures in a row before a connection is disabled.
    pub max_consecutive_failures: u32,
    /// Longest accepted event duration from a provider.
    pub max_event_span_days: i64,
    /// Forward horizon for provider change enumeration.
    pub lookahead_days: i64,
    pub merge_policy: MergePolicy,
}

/// Which side wins each field category under the `merge` strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicy {
    /// Title and description.
    pub content: MergeSide,
    /// Start, end, all-day and location.
    pub schedule: MergeSide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeSide {
    Local,
    External,
}

/// Credential store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeychainConfig {
    pub service_name: String,
}

/// Remote metadata mirror configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Mirror is disabled when unset.
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
    /// Credential store key holding the bearer token.
    pub api_token_key: String,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "caresync.db".to_string(), pool_size: 8 }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: DEFAULT_SYNC_INTERVAL_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            max_event_span_days: DEFAULT_MAX_EVENT_SPAN_DAYS,
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
            merge_policy: MergePolicy::default(),
        }
    }
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self { content: MergeSide::Local, schedule: MergeSide::External }
    }
}

impl Default for KeychainConfig {
    fn default() -> Self {
        Self { service_name: DEFAULT_KEYCHAIN_SERVICE.to_string() }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self { base_url: None, timeout_seconds: 10, api_token_key: "remote_api_token".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

impl Config {
    /// Reject values the sync engine cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.database.pool_size == 0 {
            return Err(CareSyncError::Config("database.pool_size must be > 0".into()));
        }
        self.sync.validate()?;
        if self.keychain.service_name.trim().is_empty() {
            return Err(CareSyncError::Config("keychain.service_name must not be empty".into()));
        }
        Ok(())
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(CareSyncError::Config("sync.max_attempts must be > 0".into()));
        }
        if self.max_event_span_days <= 0 {
            return Err(CareSyncError::Config("sync.max_event_span_days must be > 0".into()));
        }
        if self.lookahead_days <= 0 {
            return Err(CareSyncError::Config("sync.lookahead_days must be > 0".into()));
        }
        if self.backoff_multiplier <= 0.0 {
            return Err(CareSyncError::Config("sync.backoff_multiplier must be > 0".into()));
        }
        if self.interval_seconds == 0 {
            return Err(CareSyncError::Config("sync.interval_seconds must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.max_attempts, 3);
        assert_eq!(config.sync.merge_policy.content, MergeSide::Local);
        assert_eq!(config.sync.merge_policy.schedule, MergeSide::External);
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = Config::default();
        config.sync.max_attempts = 0;
        assert!(matches!(config.validate(), Err(CareSyncError::Config(_))));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"sync": {"max_event_span_days": 30}}"#).unwrap();
        assert_eq!(config.sync.max_event_span_days, 30);
        assert_eq!(config.sync.interval_seconds, 900);
        assert_eq!(config.database.pool_size, 8);
    }
}
