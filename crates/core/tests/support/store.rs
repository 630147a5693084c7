use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use caresync_core::CalendarStore;
use caresync_domain::{
    CalendarConnection, CalendarEvent, CareSyncError, ConnectionStatus, ProviderKind,
    Result as DomainResult, SyncStatus,
};
use tokio::sync::Notify;
use uuid::Uuid;

use super::provider::Gate;

#[derive(Default)]
struct State {
    connections: Vec<CalendarConnection>,
    events: Vec<CalendarEvent>,
    event_writes: usize,
}

/// In-memory `CalendarStore`.
///
/// Keeps insertion order and enforces `(connection_id, external_id)`
/// uniqueness like the SQLite store does. `hold_get_connection` parks the
/// next `get_connection` after it has read the row.
#[derive(Default, Clone)]
pub struct MemoryCalendarStore {
    state: Arc<Mutex<State>>,
    gate: Arc<Mutex<Option<Gate>>>,
}

impl MemoryCalendarStore {
    pub fn events(&self) -> Vec<CalendarEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn event(&self, id: Uuid) -> Option<CalendarEvent> {
        self.state.lock().unwrap().events.iter().find(|e| e.id == id).cloned()
    }

    pub fn connection(&self, id: Uuid) -> Option<CalendarConnection> {
        self.state.lock().unwrap().connections.iter().find(|c| c.id == id).cloned()
    }

    pub fn hold_get_connection(&self) -> Gate {
        let gate = Gate { entered: Arc::new(Notify::new()), release: Arc::new(Notify::new()) };
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Number of event upserts and deletes so far.
    pub fn event_writes(&self) -> usize {
        self.state.lock().unwrap().event_writes
    }

    /// Overwrite a stored event without touching its checksum.
    pub fn tamper(&self, id: Uuid, mutate: impl FnOnce(&mut CalendarEvent)) {
        let mut state = self.state.lock().unwrap();
        if let Some(event) = state.events.iter_mut().find(|e| e.id == id) {
            mutate(event);
        }
    }

    fn put(state: &mut State, event: &CalendarEvent) -> DomainResult<()> {
        if let Some(external_id) = event.external_id.as_linked() {
            let clash = state.events.iter().any(|e| {
                e.id != event.id
                    && e.connection_id == event.connection_id
                    && e.external_id.as_linked() == Some(external_id)
            });
            if clash {
                return Err(CareSyncError::Database(format!(
                    "duplicate external id {external_id}"
                )));
            }
        }
        match state.events.iter_mut().find(|e| e.id == event.id) {
            Some(existing) => *existing = event.clone(),
            None => state.events.push(event.clone()),
        }
        state.event_writes += 1;
        Ok(())
    }
}

#[async_trait]
impl CalendarStore for MemoryCalendarStore {
    async fn list_connections(&self) -> DomainResult<Vec<CalendarConnection>> {
        Ok(self.state.lock().unwrap().connections.clone())
    }

    async fn get_connection(&self, id: Uuid) -> DomainResult<Option<CalendarConnection>> {
        let connection = self.connection(id);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Ok(connection)
    }

    async fn find_live_connection(
        &self,
        circle_id: Uuid,
        provider: ProviderKind,
    ) -> DomainResult<Option<CalendarConnection>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .connections
            .iter()
            .find(|c| {
                c.circle_id == circle_id
                    && c.provider == provider
                    && c.status != ConnectionStatus::Disabled
            })
            .cloned())
    }

    async fn insert_connection(&self, connection: &CalendarConnection) -> DomainResult<()> {
        self.state.lock().unwrap().connections.push(connection.clone());
        Ok(())
    }

    async fn update_connection(&self, connection: &CalendarConnection) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        let existing = state
            .connections
            .iter_mut()
            .find(|c| c.id == connection.id)
            .ok_or_else(|| CareSyncError::NotFound(connection.id.to_string()))?;
        *existing = connection.clone();
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> DomainResult<Option<CalendarEvent>> {
        Ok(self.event(id))
    }

    async fn find_event_by_external_id(
        &self,
        connection_id: Uuid,
        external_id: &str,
    ) -> DomainResult<Option<CalendarEvent>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .events
            .iter()
            .find(|e| {
                e.connection_id == connection_id && e.external_id.as_linked() == Some(external_id)
            })
            .cloned())
    }

    async fn list_events(
        &self,
        connection_id: Uuid,
        status: Option<SyncStatus>,
    ) -> DomainResult<Vec<CalendarEvent>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.connection_id == connection_id)
            .filter(|e| status.map_or(true, |s| e.sync_status() == s))
            .cloned()
            .collect())
    }

    async fn list_events_by_circle(&self, circle_id: Uuid) -> DomainResult<Vec<CalendarEvent>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.circle_id == circle_id)
            .cloned()
            .collect())
    }

    async fn upsert_event(&self, event: &CalendarEvent) -> DomainResult<()> {
        Self::put(&mut self.state.lock().unwrap(), event)
    }

    async fn upsert_events(&self, events: &[CalendarEvent]) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        for event in events {
            Self::put(&mut state, event)?;
        }
        Ok(())
    }

    async fn delete_event(&self, id: Uuid) -> DomainResult<bool> {
        let mut state = self.state.lock().unwrap();
        let before = state.events.len();
        state.events.retain(|e| e.id != id);
        let removed = state.events.len() != before;
        if removed {
            state.event_writes += 1;
        }
        Ok(removed)
    }
}
