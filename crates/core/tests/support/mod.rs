//! Shared test helpers for `caresync-core` integration tests.
//!
//! In-memory implementations of every core port plus a [`Harness`] that
//! wires them into a [`SyncOrchestrator`].

#![allow(dead_code)]

pub mod audit;
pub mod credentials;
pub mod provider;
pub mod store;

use std::sync::Arc;

use caresync_core::{StaticProviderRegistry, SyncDependencies, SyncOrchestrator};
use caresync_domain::{
    CalendarConnection, ConflictStrategy, EventFields, NewConnection, ProviderKind, SyncConfig,
    SyncDirection,
};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

pub use audit::{RecordingAuditSink, RecordingMirror};
pub use credentials::MemoryCredentialStore;
pub use provider::ScriptedProvider;
pub use store::MemoryCalendarStore;

pub const ACCOUNT: &str = "carer@example.com";

/// Orchestrator wired to in-memory collaborators.
pub struct Harness {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub store: Arc<MemoryCalendarStore>,
    pub provider: Arc<ScriptedProvider>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub audit: Arc<RecordingAuditSink>,
    pub mirror: Arc<RecordingMirror>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        let store = Arc::new(MemoryCalendarStore::default());
        let provider = Arc::new(ScriptedProvider::default());
        let credentials = Arc::new(MemoryCredentialStore::default());
        let audit = Arc::new(RecordingAuditSink::default());
        let mirror = Arc::new(RecordingMirror::default());

        let registry = StaticProviderRegistry::new().with_adapter(provider.clone());
        let orchestrator = SyncOrchestrator::new(
            SyncDependencies {
                store: store.clone(),
                providers: Arc::new(registry),
                mirror: mirror.clone(),
                audit: audit.clone(),
                credentials: credentials.clone(),
            },
            config,
        )
        .expect("valid sync config");

        Self { orchestrator: Arc::new(orchestrator), store, provider, credentials, audit, mirror }
    }

    /// Create a Google connection for a fresh circle.
    pub async fn connect(
        &self,
        direction: SyncDirection,
        strategy: ConflictStrategy,
    ) -> CalendarConnection {
        self.orchestrator
            .connect_provider(new_connection(direction, strategy))
            .await
            .expect("connect provider")
    }
}

pub fn new_connection(direction: SyncDirection, strategy: ConflictStrategy) -> NewConnection {
    NewConnection {
        circle_id: Uuid::new_v4(),
        provider: ProviderKind::Google,
        calendar_id: "primary".to_string(),
        account: ACCOUNT.to_string(),
        direction,
        strategy,
    }
}

/// One-hour event starting at `start`.
pub fn fields(title: &str, start: DateTime<Utc>) -> EventFields {
    EventFields {
        title: title.to_string(),
        description: None,
        start,
        end: start + Duration::hours(1),
        all_day: false,
        location: None,
    }
}

/// `Utc::now()` shifted by whole minutes.
pub fn minutes_from_now(minutes: i64) -> DateTime<Utc> {
    Utc::now() + Duration::minutes(minutes)
}
