//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If a required variable is missing, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! Every loaded configuration is validated before it is returned.
//!
//! ## Environment Variables
//! Required:
//! - `CARESYNC_DB_PATH`: Database file path
//! - `CARESYNC_DB_POOL_SIZE`: Connection pool size
//! - `CARESYNC_SYNC_INTERVAL`: Scheduler period in seconds
//!
//! Optional (defaults apply when unset):
//! - `CARESYNC_SYNC_ENABLED`: Whether periodic sync runs (true/false)
//! - `CARESYNC_SYNC_MAX_ATTEMPTS`: Attempts per sync pass
//! - `CARESYNC_SYNC_MAX_FAILURES`: Failed passes before a connection is disabled
//! - `CARESYNC_KEYCHAIN_SERVICE`: Keychain service name
//! - `CARESYNC_REMOTE_URL`: Base URL of the metadata mirror
//! - `CARESYNC_LOG_LEVEL`: Default log level
//! - `CARESYNC_LOG_JSON`: Emit JSON log lines (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./caresync.toml`, `./caresync.json`, `./config.toml`, `./config.json`
//! 2. The same names in the parent and grandparent directories
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use caresync_domain::{
    CareSyncError, Config, DatabaseConfig, KeychainConfig, LoggingConfig, RemoteConfig, Result,
    SyncConfig,
};

const CONFIG_FILE_NAMES: [&str; 4] = ["caresync.toml", "caresync.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `CareSyncError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - Values fail validation
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `CareSyncError::Config` if required variables are missing
/// or have invalid values.
pub fn load_from_env() -> Result<Config> {
    let db_path = env_var("CARESYNC_DB_PATH")?;
    let db_pool_size = env_parse::<u32>("CARESYNC_DB_POOL_SIZE")?;
    let sync_interval = env_parse::<u64>("CARESYNC_SYNC_INTERVAL")?;

    let mut sync = SyncConfig {
        enabled: env_bool("CARESYNC_SYNC_ENABLED", true),
        interval_seconds: sync_interval,
        ..SyncConfig::default()
    };
    if let Some(attempts) = env_parse_opt::<u32>("CARESYNC_SYNC_MAX_ATTEMPTS")? {
        sync.max_attempts = attempts;
    }
    if let Some(failures) = env_parse_opt::<u32>("CARESYNC_SYNC_MAX_FAILURES")? {
        sync.max_consecutive_failures = failures;
    }

    let keychain = std::env::var("CARESYNC_KEYCHAIN_SERVICE")
        .map(|service_name| KeychainConfig { service_name })
        .unwrap_or_default();

    let remote = RemoteConfig {
        base_url: std::env::var("CARESYNC_REMOTE_URL").ok().filter(|url| !url.trim().is_empty()),
        ..RemoteConfig::default()
    };

    let logging = LoggingConfig {
        level: std::env::var("CARESYNC_LOG_LEVEL").unwrap_or_else(|_| LoggingConfig::default().level),
        json: env_bool("CARESYNC_LOG_JSON", false),
    };

    let config = Config {
        database: DatabaseConfig { path: db_path, pool_size: db_pool_size },
        sync,
        keychain,
        remote,
        logging,
    };
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Format is detected by file extension.
///
/// # Errors
/// Returns `CareSyncError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - Values fail validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CareSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            CareSyncError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CareSyncError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content; format by extension.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CareSyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CareSyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(CareSyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe the working directory, its parents and the executable directory
/// for a config file.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.push(exe_dir.to_path_buf());
        }
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| CareSyncError::Config(format!("Missing required environment variable: {key}")))
}

fn env_parse<T>(key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env_var(key)?;
    raw.trim().parse::<T>().map_err(|e| CareSyncError::Config(format!("Invalid value for {key}: {e}")))
}

fn env_parse_opt<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(_) => env_parse(key).map(Some),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use tempfile::{Builder, NamedTempFile};

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: [&str; 10] = [
        "CARESYNC_DB_PATH",
        "CARESYNC_DB_POOL_SIZE",
        "CARESYNC_SYNC_INTERVAL",
        "CARESYNC_SYNC_ENABLED",
        "CARESYNC_SYNC_MAX_ATTEMPTS",
        "CARESYNC_SYNC_MAX_FAILURES",
        "CARESYNC_KEYCHAIN_SERVICE",
        "CARESYNC_REMOTE_URL",
        "CARESYNC_LOG_LEVEL",
        "CARESYNC_LOG_JSON",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    fn write_temp(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().expect("temp file created");
        file.write_all(contents.as_bytes()).expect("temp file written");
        file
    }

    #[test]
    fn env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("CARESYNC_TEST_BOOL_ON", "On");
        std::env::set_var("CARESYNC_TEST_BOOL_OFF", "0");
        std::env::remove_var("CARESYNC_TEST_BOOL_MISSING");

        assert!(env_bool("CARESYNC_TEST_BOOL_ON", false));
        assert!(!env_bool("CARESYNC_TEST_BOOL_OFF", true));
        assert!(env_bool("CARESYNC_TEST_BOOL_MISSING", true));

        std::env::remove_var("CARESYNC_TEST_BOOL_ON");
        std::env::remove_var("CARESYNC_TEST_BOOL_OFF");
    }

    /// Validates `load_from_env` behavior for the all-variables-set scenario.
    ///
    /// Assertions:
    /// - Required variables populate database and sync sections
    /// - Optional overrides are applied
    /// - Untouched settings keep their defaults
    #[test]
    fn load_from_env_with_overrides() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("CARESYNC_DB_PATH", "/tmp/caresync-test.db");
        std::env::set_var("CARESYNC_DB_POOL_SIZE", "4");
        std::env::set_var("CARESYNC_SYNC_INTERVAL", "60");
        std::env::set_var("CARESYNC_SYNC_ENABLED", "false");
        std::env::set_var("CARESYNC_SYNC_MAX_ATTEMPTS", "5");
        std::env::set_var("CARESYNC_REMOTE_URL", "https://mirror.example.com");
        std::env::set_var("CARESYNC_LOG_JSON", "yes");

        let result = load_from_env();
        clear_env();

        let config = result.expect("config loaded from env");
        assert_eq!(config.database.path, "/tmp/caresync-test.db");
        assert_eq!(config.database.pool_size, 4);
        assert_eq!(config.sync.interval_seconds, 60);
        assert!(!config.sync.enabled);
        assert_eq!(config.sync.max_attempts, 5);
        assert_eq!(config.sync.max_consecutive_failures, 5);
        assert_eq!(config.remote.base_url.as_deref(), Some("https://mirror.example.com"));
        assert!(config.logging.json);
        assert_eq!(config.keychain, KeychainConfig::default());
    }

    #[test]
    fn load_from_env_missing_required_var() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("CARESYNC_DB_PATH", "/tmp/caresync-test.db");

        let result = load_from_env();
        clear_env();

        assert!(matches!(result, Err(CareSyncError::Config(_))));
    }

    #[test]
    fn load_from_env_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("CARESYNC_DB_PATH", "/tmp/caresync-test.db");
        std::env::set_var("CARESYNC_DB_POOL_SIZE", "many");
        std::env::set_var("CARESYNC_SYNC_INTERVAL", "60");

        let result = load_from_env();
        clear_env();

        match result {
            Err(CareSyncError::Config(msg)) => assert!(msg.contains("CARESYNC_DB_POOL_SIZE")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn load_from_env_rejects_invalid_values() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("CARESYNC_DB_PATH", "/tmp/caresync-test.db");
        std::env::set_var("CARESYNC_DB_POOL_SIZE", "0");
        std::env::set_var("CARESYNC_SYNC_INTERVAL", "60");

        let result = load_from_env();
        clear_env();

        assert!(matches!(result, Err(CareSyncError::Config(_))));
    }

    #[test]
    fn load_from_toml_file_fills_defaults() {
        let file = write_temp(
            ".toml",
            r#"
                [database]
                path = "care.db"
                pool_size = 2

                [sync]
                max_event_span_days = 30

                [sync.merge_policy]
                content = "external"
            "#,
        );

        let config = load_from_file(Some(file.path().to_path_buf())).expect("toml loaded");
        assert_eq!(config.database.path, "care.db");
        assert_eq!(config.database.pool_size, 2);
        assert_eq!(config.sync.max_event_span_days, 30);
        assert_eq!(config.sync.interval_seconds, 900);
        assert_eq!(config.sync.merge_policy.content, caresync_domain::MergeSide::External);
        assert_eq!(config.sync.merge_policy.schedule, caresync_domain::MergeSide::External);
    }

    #[test]
    fn load_from_json_file() {
        let file = write_temp(
            ".json",
            r#"{"remote": {"base_url": "https://mirror.example.com", "timeout_seconds": 3}}"#,
        );

        let config = load_from_file(Some(file.path().to_path_buf())).expect("json loaded");
        assert_eq!(config.remote.timeout_seconds, 3);
        assert_eq!(config.database, DatabaseConfig::default());
    }

    #[test]
    fn load_from_file_rejects_invalid_values() {
        let file = write_temp(".toml", "[sync]\nmax_attempts = 0\n");

        let result = load_from_file(Some(file.path().to_path_buf()));
        assert!(matches!(result, Err(CareSyncError::Config(_))));
    }

    #[test]
    fn load_from_missing_file_fails() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/caresync.toml")));
        assert!(matches!(result, Err(CareSyncError::Config(_))));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let result = parse_config("key: value", Path::new("config.yaml"));
        match result {
            Err(CareSyncError::Config(msg)) => assert!(msg.contains("yaml")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let result = parse_config("[database\npath = ", Path::new("caresync.toml"));
        assert!(matches!(result, Err(CareSyncError::Config(_))));
    }
}
