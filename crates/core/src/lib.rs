//! # CareSync Core
//!
//! Calendar sync engine - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces for providers, storage, credentials and audit
//! - Integrity checks and snapshot encryption
//! - Change classification and conflict resolution
//! - The sync orchestrator
//!
//! ## Architecture Principles
//! - Depends only on `caresync-common` and `caresync-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod conflict;
pub mod integrity;
pub mod sync;
pub mod validation;

// Infrastructure ports
pub mod calendar_ports;
pub mod credential_ports;

pub use calendar_ports::{ProviderAdapter, ProviderRegistry, StaticProviderRegistry};
pub use conflict::{Classification, ConflictResolver, Resolution};
pub use credential_ports::CredentialStore;
pub use integrity::{IntegrityCheck, IntegrityManager};
pub use sync::{
    AuditEvent, AuditSink, CalendarStore, MetadataMirror, NoopMirror, PassReport, SyncAllReport,
    SyncDependencies, SyncError, SyncOrchestrator, TracingAuditSink,
};
