use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use caresync_core::{AuditEvent, AuditSink, MetadataMirror};
use caresync_domain::{CalendarConnection, CareSyncError, Result as DomainResult};
use uuid::Uuid;

/// Audit sink that keeps every record.
#[derive(Default, Clone)]
pub struct RecordingAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl RecordingAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(AuditEvent::kind).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Mirror that records operations and can be told to fail.
#[derive(Default, Clone)]
pub struct RecordingMirror {
    ops: Arc<Mutex<Vec<(String, Uuid)>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingMirror {
    pub fn ops(&self) -> Vec<(String, Uuid)> {
        self.ops.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    fn record(&self, op: &str, id: Uuid) -> DomainResult<()> {
        self.ops.lock().unwrap().push((op.to_string(), id));
        if *self.failing.lock().unwrap() {
            return Err(CareSyncError::Network("mirror unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataMirror for RecordingMirror {
    async fn fetch_connection(&self, id: Uuid) -> DomainResult<Option<CalendarConnection>> {
        self.record("fetch", id)?;
        Ok(None)
    }

    async fn insert_connection(&self, connection: &CalendarConnection) -> DomainResult<()> {
        self.record("insert", connection.id)
    }

    async fn update_connection(&self, connection: &CalendarConnection) -> DomainResult<()> {
        self.record("update", connection.id)
    }

    async fn delete_connection(&self, id: Uuid) -> DomainResult<()> {
        self.record("delete", id)
    }
}
