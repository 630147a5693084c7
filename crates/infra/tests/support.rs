#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use caresync_core::CredentialStore;
use caresync_domain::{
    CalendarConnection, ConflictStrategy, EventFields, NewConnection, ProviderKind, Result,
    SyncDirection,
};
use caresync_infra::database::DbManager;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use uuid::Uuid;

/// Temporary database wrapper that keeps the underlying file alive for the
/// duration of a test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a migrated database in a fresh temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("test.db");

        let manager = DbManager::new(&db_path, 4).expect("db manager should be created");
        manager.run_migrations().expect("schema migrations should apply");

        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }

    /// Execute a batch of SQL statements against the database.
    pub fn execute_batch(&self, sql: &str) {
        let conn = self
            .manager
            .get_connection()
            .expect("connection should be available for execute_batch");
        conn.execute_batch(sql).expect("SQL batch execution should succeed");
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory `CredentialStore`.
#[derive(Default, Clone)]
pub struct MemoryCredentialStore {
    secrets: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryCredentialStore {
    pub fn with_secret(name: &str, value: &str) -> Self {
        let store = Self::default();
        store.secrets.lock().unwrap().insert(name.to_string(), value.to_string());
        store
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_secret(&self, name: &str) -> Result<Option<String>> {
        Ok(self.secrets.lock().unwrap().get(name).cloned())
    }

    async fn get_or_create_key(&self, name: &str, byte_len: usize) -> Result<String> {
        let mut secrets = self.secrets.lock().unwrap();
        let key = secrets.entry(name.to_string()).or_insert_with(|| "ab".repeat(byte_len));
        Ok(key.clone())
    }

    async fn replace_key(&self, name: &str, byte_len: usize) -> Result<String> {
        let key = "cd".repeat(byte_len);
        self.secrets.lock().unwrap().insert(name.to_string(), key.clone());
        Ok(key)
    }

    async fn delete_secret(&self, name: &str) -> Result<()> {
        self.secrets.lock().unwrap().remove(name);
        Ok(())
    }
}

pub const ACCOUNT: &str = "carer@example.com";

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, hour, minute, 0).unwrap()
}

pub fn fields(title: &str) -> EventFields {
    EventFields {
        title: title.to_string(),
        description: Some("Bring the medication list".to_string()),
        start: at(9, 0),
        end: at(10, 0),
        all_day: false,
        location: Some("Clinic".to_string()),
    }
}

pub fn connection(circle_id: Uuid) -> CalendarConnection {
    CalendarConnection::new(
        NewConnection {
            circle_id,
            provider: ProviderKind::Google,
            calendar_id: "primary".to_string(),
            account: ACCOUNT.to_string(),
            direction: SyncDirection::Bidirectional,
            strategy: ConflictStrategy::Manual,
        },
        at(8, 0),
    )
}
