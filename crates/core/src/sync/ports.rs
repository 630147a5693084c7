//! Port interfaces for sync operations

use async_trait::async_trait;
use caresync_domain::{
    CalendarConnection, CalendarEvent, ConflictField, ProviderKind, ResolutionLabel, Result,
    SyncStatus,
};
use serde::Serialize;
use uuid::Uuid;

/// Local authoritative store for connections and events.
///
/// Every method runs in its own transaction. `(connection_id, external_id)`
/// is unique, so upserting a pulled event twice never duplicates it.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// All connections in creation order
    async fn list_connections(&self) -> Result<Vec<CalendarConnection>>;

    async fn get_connection(&self, id: Uuid) -> Result<Option<CalendarConnection>>;

    /// Active or erroring (not disabled) connection for a circle/provider pair
    async fn find_live_connection(
        &self,
        circle_id: Uuid,
        provider: ProviderKind,
    ) -> Result<Option<CalendarConnection>>;

    async fn insert_connection(&self, connection: &CalendarConnection) -> Result<()>;

    async fn update_connection(&self, connection: &CalendarConnection) -> Result<()>;

    async fn get_event(&self, id: Uuid) -> Result<Option<CalendarEvent>>;

    async fn find_event_by_external_id(
        &self,
        connection_id: Uuid,
        external_id: &str,
    ) -> Result<Option<CalendarEvent>>;

    /// Events of a connection, optionally filtered by status
    async fn list_events(
        &self,
        connection_id: Uuid,
        status: Option<SyncStatus>,
    ) -> Result<Vec<CalendarEvent>>;

    async fn list_events_by_circle(&self, circle_id: Uuid) -> Result<Vec<CalendarEvent>>;

    /// Insert or replace by event id
    async fn upsert_event(&self, event: &CalendarEvent) -> Result<()>;

    /// Upsert many events in a single transaction
    async fn upsert_events(&self, events: &[CalendarEvent]) -> Result<()>;

    /// Returns whether a row was removed
    async fn delete_event(&self, id: Uuid) -> Result<bool>;
}

/// Remote copy of connection metadata. Failures are logged by the caller,
/// never surfaced.
#[async_trait]
pub trait MetadataMirror: Send + Sync {
    async fn fetch_connection(&self, id: Uuid) -> Result<Option<CalendarConnection>>;

    async fn insert_connection(&self, connection: &CalendarConnection) -> Result<()>;

    async fn update_connection(&self, connection: &CalendarConnection) -> Result<()>;

    async fn delete_connection(&self, id: Uuid) -> Result<()>;
}

/// Fire-and-forget audit trail
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Audit records carry identifiers, counts and sanitized codes only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    ConnectionCreated {
        connection_id: Uuid,
        circle_id: Uuid,
        provider: ProviderKind,
    },
    ConnectionDisabled {
        connection_id: Uuid,
        code: String,
    },
    PassCompleted {
        connection_id: Uuid,
        pushed: usize,
        pulled: usize,
        conflicts: usize,
        attempts: u32,
    },
    PassFailed {
        connection_id: Uuid,
        code: String,
        attempts: u32,
    },
    ConflictDetected {
        connection_id: Uuid,
        event_id: Uuid,
        fields: Vec<ConflictField>,
    },
    ConflictResolved {
        connection_id: Uuid,
        event_id: Uuid,
        resolution: ResolutionLabel,
        confidence: f32,
    },
    IntegrityMismatch {
        connection_id: Uuid,
        event_id: Uuid,
    },
    ExternalRangeRejected {
        connection_id: Uuid,
        external_id: String,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionCreated { .. } => "connection_created",
            Self::ConnectionDisabled { .. } => "connection_disabled",
            Self::PassCompleted { .. } => "pass_completed",
            Self::PassFailed { .. } => "pass_failed",
            Self::ConflictDetected { .. } => "conflict_detected",
            Self::ConflictResolved { .. } => "conflict_resolved",
            Self::IntegrityMismatch { .. } => "integrity_mismatch",
            Self::ExternalRangeRejected { .. } => "external_range_rejected",
        }
    }
}

/// Mirror that accepts and forgets everything; used when no remote is
/// configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMirror;

#[async_trait]
impl MetadataMirror for NoopMirror {
    async fn fetch_connection(&self, _id: Uuid) -> Result<Option<CalendarConnection>> {
        Ok(None)
    }

    async fn insert_connection(&self, _connection: &CalendarConnection) -> Result<()> {
        Ok(())
    }

    async fn update_connection(&self, _connection: &CalendarConnection) -> Result<()> {
        Ok(())
    }

    async fn delete_connection(&self, _id: Uuid) -> Result<()> {
        Ok(())
    }
}

/// Audit sink that writes records to the tracing log only
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        tracing::info!(audit = event.kind(), ?event, "audit");
    }
}
