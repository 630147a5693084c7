//! Domain types and models

pub mod calendar;

pub use calendar::{
    CalendarConnection, CalendarEvent, ConflictField, ConflictSnapshot, ConflictStrategy,
    ConnectionStatus, EventFields, ExternalEvent, ExternalId, ManualResolution, NewConnection,
    ProviderKind, ResolutionLabel, SnapshotSide, SourceKind, SourceLink, SyncDirection,
    SyncOutcome, SyncStatus,
};
