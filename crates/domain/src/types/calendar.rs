//! Calendar sync models.
//!
//! A [`CalendarConnection`] binds one care circle to one external calendar.
//! Every synchronizable item is a [`CalendarEvent`] in canonical form;
//! providers translate to and from [`ExternalEvent`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CareSyncError, Result};
use crate::impl_domain_status_conversions;

// ============================================================================
// Enumerations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Google,
    Outlook,
}

impl_domain_status_conversions!(ProviderKind {
    Google => "google",
    Outlook => "outlook",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    Bidirectional,
    PushOnly,
    PullOnly,
}

impl_domain_status_conversions!(SyncDirection {
    Bidirectional => "bidirectional",
    PushOnly => "push_only",
    PullOnly => "pull_only",
});

impl SyncDirection {
    pub fn pushes(self) -> bool {
        !matches!(self, Self::PullOnly)
    }

    pub fn pulls(self) -> bool {
        !matches!(self, Self::PushOnly)
    }
}

/// How a connection settles events changed on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    LocalWins,
    ExternalWins,
    Manual,
    Merge,
}

impl_domain_status_conversions!(ConflictStrategy {
    LocalWins => "local_wins",
    ExternalWins => "external_wins",
    Manual => "manual",
    Merge => "merge",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Active,
    Error,
    Disabled,
}

impl_domain_status_conversions!(ConnectionStatus {
    Active => "active",
    Error => "error",
    Disabled => "disabled",
});

/// Result of the most recent sync pass for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Success,
    Failed,
    Unauthorized,
    Cancelled,
}

impl_domain_status_conversions!(SyncOutcome {
    Success => "success",
    Failed => "failed",
    Unauthorized => "unauthorized",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    PendingPush,
    /// Local copy is untrusted; the next pull overwrites it.
    PendingPull,
    Conflict,
    Deleted,
    Error,
}

impl_domain_status_conversions!(SyncStatus {
    Synced => "synced",
    PendingPush => "pending_push",
    PendingPull => "pending_pull",
    Conflict => "conflict",
    Deleted => "deleted",
    Error => "error",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Task,
    Shift,
    Appointment,
    Other,
}

impl_domain_status_conversions!(SourceKind {
    Task => "task",
    Shift => "shift",
    Appointment => "appointment",
    Other => "other",
});

/// User decision for an event parked in `conflict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualResolution {
    KeepLocal,
    KeepExternal,
    Merge,
    /// Accept neither change and revert to the last synced values.
    Discard,
}

impl_domain_status_conversions!(ManualResolution {
    KeepLocal => "keep_local",
    KeepExternal => "keep_external",
    Merge => "merge",
    Discard => "discard",
});

/// Label recorded on an event once a conflict has been settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionLabel {
    LocalWins,
    ExternalWins,
    Merged,
    KeepLocal,
    KeepExternal,
    ManualMerge,
    Discarded,
}

impl_domain_status_conversions!(ResolutionLabel {
    LocalWins => "local_wins",
    ExternalWins => "external_wins",
    Merged => "merged",
    KeepLocal => "keep_local",
    KeepExternal => "keep_external",
    ManualMerge => "manual_merge",
    Discarded => "discarded",
});

impl From<ManualResolution> for ResolutionLabel {
    fn from(resolution: ManualResolution) -> Self {
        match resolution {
            ManualResolution::KeepLocal => Self::KeepLocal,
            ManualResolution::KeepExternal => Self::KeepExternal,
            ManualResolution::Merge => Self::ManualMerge,
            ManualResolution::Discard => Self::Discarded,
        }
    }
}

/// One of the six fields compared between local and external copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictField {
    Title,
    Description,
    Start,
    End,
    AllDay,
    Location,
}

impl_domain_status_conversions!(ConflictField {
    Title => "title",
    Description => "description",
    Start => "start",
    End => "end",
    AllDay => "all_day",
    Location => "location",
});

impl ConflictField {
    /// Title and description carry care content; the rest is scheduling.
    pub fn is_content(self) -> bool {
        matches!(self, Self::Title | Self::Description)
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// Provider-side identifier of an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "id", rename_all = "snake_case")]
pub enum ExternalId {
    #[default]
    NotYetCreated,
    Linked(String),
}

impl ExternalId {
    pub fn as_linked(&self) -> Option<&str> {
        match self {
            Self::Linked(id) => Some(id),
            Self::NotYetCreated => None,
        }
    }

    pub fn is_linked(&self) -> bool {
        matches!(self, Self::Linked(_))
    }
}

impl From<Option<String>> for ExternalId {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(id) if !id.is_empty() => Self::Linked(id),
            _ => Self::NotYetCreated,
        }
    }
}

/// Entity in the care app that produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub kind: SourceKind,
    pub id: String,
}

// ============================================================================
// Event fields
// ============================================================================

/// The comparable, synchronizable content of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFields {
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub location: Option<String>,
}

impl EventFields {
    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    /// Fields whose values differ, in declaration order.
    pub fn differing_fields(&self, other: &Self) -> Vec<ConflictField> {
        let mut fields = Vec::new();
        if self.title != other.title {
            fields.push(ConflictField::Title);
        }
        if self.description != other.description {
            fields.push(ConflictField::Description);
        }
        if self.start != other.start {
            fields.push(ConflictField::Start);
        }
        if self.end != other.end {
            fields.push(ConflictField::End);
        }
        if self.all_day != other.all_day {
            fields.push(ConflictField::AllDay);
        }
        if self.location != other.location {
            fields.push(ConflictField::Location);
        }
        fields
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Binding between one circle and one external provider calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarConnection {
    pub id: Uuid,
    pub circle_id: Uuid,
    pub provider: ProviderKind,
    /// Calendar identifier on the provider side.
    pub calendar_id: String,
    /// Credential store label for the provider access token.
    pub account: String,
    pub direction: SyncDirection,
    pub strategy: ConflictStrategy,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_outcome: Option<SyncOutcome>,
    pub status: ConnectionStatus,
    pub consecutive_failures: u32,
    pub last_error_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to `connect_provider`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConnection {
    pub circle_id: Uuid,
    pub provider: ProviderKind,
    pub calendar_id: String,
    pub account: String,
    pub direction: SyncDirection,
    pub strategy: ConflictStrategy,
}

impl CalendarConnection {
    pub fn new(input: NewConnection, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            circle_id: input.circle_id,
            provider: input.provider,
            calendar_id: input.calendar_id,
            account: input.account,
            direction: input.direction,
            strategy: input.strategy,
            last_sync_at: None,
            last_sync_outcome: None,
            status: ConnectionStatus::Active,
            consecutive_failures: 0,
            last_error_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Disabled connections are never synced.
    pub fn is_syncable(&self) -> bool {
        self.status != ConnectionStatus::Disabled
    }
}

// ============================================================================
// Events
// ============================================================================

/// Canonical representation of one synchronizable item.
///
/// `sync_status` and `conflict_snapshot` are private: an event is in
/// [`SyncStatus::Conflict`] exactly when it holds an encrypted snapshot, and
/// only [`CalendarEvent::enter_conflict`] / [`CalendarEvent::leave_conflict`]
/// move it across that boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub circle_id: Uuid,
    pub source: Option<SourceLink>,
    pub external_id: ExternalId,
    pub fields: EventFields,
    sync_status: SyncStatus,
    pub local_modified_at: DateTime<Utc>,
    pub external_modified_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Field values as of the last successful sync.
    pub synced_fields: Option<EventFields>,
    pub checksum: Option<String>,
    conflict_snapshot: Option<String>,
    pub conflict_detected_at: Option<DateTime<Utc>>,
    pub conflict_resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<ResolutionLabel>,
    pub error_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CalendarEvent {
    /// A locally created event waiting for its first push.
    pub fn new_local(
        connection: &CalendarConnection,
        fields: EventFields,
        source: Option<SourceLink>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            connection_id: connection.id,
            circle_id: connection.circle_id,
            source,
            external_id: ExternalId::NotYetCreated,
            fields,
            sync_status: SyncStatus::PendingPush,
            local_modified_at: now,
            external_modified_at: None,
            last_synced_at: None,
            synced_fields: None,
            checksum: None,
            conflict_snapshot: None,
            conflict_detected_at: None,
            conflict_resolved_at: None,
            resolution: None,
            error_code: None,
            created_at: now,
        }
    }

    /// An event mapped from the provider, already in sync.
    pub fn from_provider(
        connection: &CalendarConnection,
        external_id: String,
        fields: EventFields,
        external_modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            connection_id: connection.id,
            circle_id: connection.circle_id,
            source: None,
            external_id: ExternalId::Linked(external_id),
            synced_fields: Some(fields.clone()),
            fields,
            sync_status: SyncStatus::Synced,
            local_modified_at: external_modified_at,
            external_modified_at: Some(external_modified_at),
            last_synced_at: Some(external_modified_at),
            checksum: None,
            conflict_snapshot: None,
            conflict_detected_at: None,
            conflict_resolved_at: None,
            resolution: None,
            error_code: None,
            created_at: external_modified_at,
        }
    }

    /// Skeleton for a stored row. Callers fill the remaining public fields
    /// and then apply [`CalendarEvent::with_sync_state`].
    pub fn from_storage(
        id: Uuid,
        connection_id: Uuid,
        circle_id: Uuid,
        fields: EventFields,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            connection_id,
            circle_id,
            source: None,
            external_id: ExternalId::NotYetCreated,
            fields,
            sync_status: SyncStatus::Synced,
            local_modified_at: created_at,
            external_modified_at: None,
            last_synced_at: None,
            synced_fields: None,
            checksum: None,
            conflict_snapshot: None,
            conflict_detected_at: None,
            conflict_resolved_at: None,
            resolution: None,
            error_code: None,
            created_at,
        }
    }

    /// Rehydrate sync state from storage, rejecting rows that break the
    /// conflict/snapshot invariant.
    pub fn with_sync_state(mut self, status: SyncStatus, snapshot: Option<String>) -> Result<Self> {
        let has_snapshot = snapshot.as_deref().is_some_and(|s| !s.is_empty());
        if (status == SyncStatus::Conflict) != has_snapshot {
            return Err(CareSyncError::Integrity(format!(
                "event {} has status {status} but snapshot present = {has_snapshot}",
                self.id
            )));
        }
        self.sync_status = status;
        self.conflict_snapshot = snapshot.filter(|s| !s.is_empty());
        Ok(self)
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    pub fn conflict_snapshot(&self) -> Option<&str> {
        self.conflict_snapshot.as_deref()
    }

    /// Move between non-conflict states.
    pub fn set_status(&mut self, status: SyncStatus) -> Result<()> {
        if status == SyncStatus::Conflict {
            return Err(CareSyncError::InvalidInput(
                "use enter_conflict to park an event in conflict".to_string(),
            ));
        }
        if self.sync_status == SyncStatus::Conflict {
            return Err(CareSyncError::InvalidInput(format!(
                "event {} is in conflict; resolve it first",
                self.id
            )));
        }
        self.sync_status = status;
        Ok(())
    }

    /// Record a successful sync of the current field values.
    pub fn mark_synced(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.set_status(SyncStatus::Synced)?;
        self.last_synced_at = Some(at);
        self.synced_fields = Some(self.fields.clone());
        self.error_code = None;
        Ok(())
    }

    /// Flag the event with a sanitized error code.
    pub fn mark_error(&mut self, code: &str) -> Result<()> {
        self.set_status(SyncStatus::Error)?;
        self.error_code = Some(code.to_string());
        Ok(())
    }

    /// Whether the fields differ from the last values exchanged with the
    /// provider. Events never synced always count as changed.
    pub fn has_unsynced_changes(&self) -> bool {
        self.synced_fields.as_ref() != Some(&self.fields)
    }

    /// Park the event in `conflict` holding an encrypted snapshot.
    pub fn enter_conflict(&mut self, encrypted_snapshot: String, at: DateTime<Utc>) -> Result<()> {
        if encrypted_snapshot.is_empty() {
            return Err(CareSyncError::Integrity("conflict snapshot is empty".to_string()));
        }
        self.sync_status = SyncStatus::Conflict;
        self.conflict_snapshot = Some(encrypted_snapshot);
        self.conflict_detected_at = Some(at);
        self.conflict_resolved_at = None;
        self.resolution = None;
        Ok(())
    }

    /// Clear the snapshot and move out of `conflict`.
    pub fn leave_conflict(
        &mut self,
        status: SyncStatus,
        label: ResolutionLabel,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.sync_status != SyncStatus::Conflict {
            return Err(CareSyncError::InvalidInput(format!("event {} is not in conflict", self.id)));
        }
        if status == SyncStatus::Conflict {
            return Err(CareSyncError::InvalidInput(
                "cannot resolve a conflict into conflict".to_string(),
            ));
        }
        self.sync_status = status;
        self.conflict_snapshot = None;
        self.conflict_resolved_at = Some(at);
        self.resolution = Some(label);
        Ok(())
    }
}

/// An event as reported by a provider, before sanitization and validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub id: String,
    pub fields: EventFields,
    pub updated_at: DateTime<Utc>,
    pub cancelled: bool,
}

// ============================================================================
// Conflict snapshot
// ============================================================================

/// One side of a conflict as captured at detection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSide {
    pub fields: EventFields,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Both sides of a conflict plus the fields that differ. Stored encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSnapshot {
    pub local: SnapshotSide,
    pub external: SnapshotSide,
    /// Values at the last successful sync, used by `discard`.
    pub baseline: Option<EventFields>,
    pub differing_fields: Vec<ConflictField>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fields(title: &str) -> EventFields {
        EventFields {
            title: title.to_string(),
            description: None,
            start: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
            all_day: false,
            location: None,
        }
    }

    fn connection() -> CalendarConnection {
        CalendarConnection::new(
            NewConnection {
                circle_id: Uuid::new_v4(),
                provider: ProviderKind::Google,
                calendar_id: "primary".into(),
                account: "carer@example.com".into(),
                direction: SyncDirection::Bidirectional,
                strategy: ConflictStrategy::Manual,
            },
            Utc::now(),
        )
    }

    #[test]
    fn differing_fields_lists_each_changed_field() {
        let a = fields("A");
        let mut b = fields("B");
        b.location = Some("Clinic".into());

        assert_eq!(a.differing_fields(&b), vec![ConflictField::Title, ConflictField::Location]);
        assert!(a.differing_fields(&a).is_empty());
    }

    #[test]
    fn conflict_requires_snapshot() {
        let mut event = CalendarEvent::new_local(&connection(), fields("A"), None, Utc::now());

        assert!(event.set_status(SyncStatus::Conflict).is_err());
        assert!(event.enter_conflict(String::new(), Utc::now()).is_err());

        event.enter_conflict("ciphertext".into(), Utc::now()).unwrap();
        assert_eq!(event.sync_status(), SyncStatus::Conflict);
        assert_eq!(event.conflict_snapshot(), Some("ciphertext"));
        assert!(event.set_status(SyncStatus::Synced).is_err());
    }

    #[test]
    fn leaving_conflict_clears_snapshot() {
        let mut event = CalendarEvent::new_local(&connection(), fields("A"), None, Utc::now());
        event.enter_conflict("ciphertext".into(), Utc::now()).unwrap();

        event.leave_conflict(SyncStatus::PendingPush, ResolutionLabel::KeepLocal, Utc::now()).unwrap();

        assert_eq!(event.sync_status(), SyncStatus::PendingPush);
        assert!(event.conflict_snapshot().is_none());
        assert_eq!(event.resolution, Some(ResolutionLabel::KeepLocal));
    }

    #[test]
    fn unsynced_changes_track_last_exchanged_fields() {
        let conn = connection();
        let local = CalendarEvent::new_local(&conn, fields("A"), None, Utc::now());
        assert!(local.has_unsynced_changes());

        let mut pulled = CalendarEvent::from_provider(&conn, "g1".into(), fields("A"), Utc::now());
        assert!(!pulled.has_unsynced_changes());

        pulled.fields.title = "B".into();
        pulled.mark_error("invalid_date_range").unwrap();
        assert!(pulled.has_unsynced_changes());

        pulled.mark_synced(Utc::now()).unwrap();
        assert!(!pulled.has_unsynced_changes());
    }

    #[test]
    fn rehydration_rejects_broken_invariant() {
        let event = CalendarEvent::new_local(&connection(), fields("A"), None, Utc::now());

        assert!(event.clone().with_sync_state(SyncStatus::Conflict, None).is_err());
        assert!(event.clone().with_sync_state(SyncStatus::Synced, Some("x".into())).is_err());
        assert!(event.with_sync_state(SyncStatus::Conflict, Some("x".into())).is_ok());
    }

    #[test]
    fn external_id_from_option() {
        assert_eq!(ExternalId::from(None), ExternalId::NotYetCreated);
        assert_eq!(ExternalId::from(Some(String::new())), ExternalId::NotYetCreated);
        assert_eq!(ExternalId::from(Some("g1".to_string())).as_linked(), Some("g1"));
    }

    #[test]
    fn direction_gates_phases() {
        assert!(!SyncDirection::PullOnly.pushes());
        assert!(!SyncDirection::PushOnly.pulls());
        assert!(SyncDirection::Bidirectional.pushes() && SyncDirection::Bidirectional.pulls());
    }
}
