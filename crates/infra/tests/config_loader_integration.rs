//! Integration tests for configuration loader
//!
//! Loads complete files from disk and feeds the result into bootstrap.

use std::io::Write;

use caresync_domain::MergeSide;
use caresync_infra::{build_orchestrator, config};
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("config file created");
    file.write_all(contents.as_bytes()).expect("config written");
    path
}

#[test]
fn test_load_every_section_from_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "caresync.toml",
        r#"
[database]
path = "/tmp/caresync-integration.db"
pool_size = 3

[sync]
interval_seconds = 120
max_attempts = 5
max_consecutive_failures = 4
lookahead_days = 30

[sync.merge_policy]
content = "external"
schedule = "local"

[keychain]
service_name = "com.caresync.integration"

[remote]
base_url = "https://mirror.example.com/v1/"
timeout_seconds = 3

[logging]
level = "debug"
json = true
"#,
    );

    let config = config::load_from_file(Some(path)).expect("config loads");

    assert_eq!(config.database.path, "/tmp/caresync-integration.db");
    assert_eq!(config.database.pool_size, 3);
    assert_eq!(config.sync.interval_seconds, 120);
    assert_eq!(config.sync.max_attempts, 5);
    assert_eq!(config.sync.max_consecutive_failures, 4);
    assert_eq!(config.sync.lookahead_days, 30);
    assert_eq!(config.sync.merge_policy.content, MergeSide::External);
    assert_eq!(config.sync.merge_policy.schedule, MergeSide::Local);
    assert_eq!(config.keychain.service_name, "com.caresync.integration");
    assert_eq!(config.remote.base_url.as_deref(), Some("https://mirror.example.com/v1/"));
    assert_eq!(config.remote.timeout_seconds, 3);
    assert_eq!(config.remote.api_token_key, "remote_api_token");
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
}

#[tokio::test]
async fn test_loaded_config_bootstraps_orchestrator() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("bootstrap.db");
    let path = write_config(
        &dir,
        "caresync.json",
        &format!(
            r#"{{
                "database": {{ "path": {path}, "pool_size": 2 }},
                "sync": {{ "interval_seconds": 60, "enabled": false }}
            }}"#,
            path = serde_json::to_string(&db_path.to_string_lossy()).unwrap()
        ),
    );

    let config = config::load_from_file(Some(path)).expect("config loads");
    let orchestrator = build_orchestrator(&config).expect("orchestrator built");

    assert!(!orchestrator.config().enabled);
    assert!(db_path.exists());

    let report = orchestrator.sync_all().await.expect("no pass in flight");
    assert!(report.results.is_empty());
}
