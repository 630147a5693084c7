//! Sync engine: ports, orchestrator and pass reporting

pub mod errors;
pub mod orchestrator;
pub mod ports;
pub mod report;

pub use errors::SyncError;
pub use orchestrator::{SyncDependencies, SyncOrchestrator};
pub use ports::{AuditEvent, AuditSink, CalendarStore, MetadataMirror, NoopMirror, TracingAuditSink};
pub use report::{PassReport, SyncAllReport};
