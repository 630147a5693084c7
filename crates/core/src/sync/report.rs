//! Counters returned from sync passes

use serde::Serialize;
use uuid::Uuid;

use super::errors::SyncError;

/// Per-connection result of one successful pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassReport {
    pub connection_id: Uuid,
    /// Events written to the provider (creates and updates)
    pub pushed: usize,
    /// Subset of `pushed` that created a new provider event
    pub created: usize,
    /// Events removed after deletion on the provider
    pub deleted: usize,
    /// Pulled events that changed local state
    pub pulled: usize,
    /// Events parked for manual review
    pub conflicts: usize,
    /// Conflicts settled by the connection's strategy
    pub resolved_automatically: usize,
    /// External updates refused for an invalid date range
    pub rejected: usize,
    /// Events marked `error` during the pass
    pub event_errors: usize,
    pub integrity_mismatches: usize,
    pub attempts: u32,
}

impl PassReport {
    pub fn new(connection_id: Uuid) -> Self {
        Self { connection_id, ..Self::default() }
    }
}

/// Result of `sync_all`: one entry per connection, in enumeration order.
#[derive(Debug, Default)]
pub struct SyncAllReport {
    pub results: Vec<(Uuid, Result<PassReport, SyncError>)>,
    /// Disabled connections that were not attempted
    pub skipped: usize,
}

impl SyncAllReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_err()).count()
    }

    pub fn get(&self, connection_id: Uuid) -> Option<&Result<PassReport, SyncError>> {
        self.results.iter().find(|(id, _)| *id == connection_id).map(|(_, r)| r)
    }
}
