use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use caresync_core::ProviderAdapter;
use caresync_domain::{
    CalendarConnection, CalendarEvent, EventFields, ExternalEvent, ProviderError, ProviderKind,
};
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Default)]
struct State {
    remote: BTreeMap<String, ExternalEvent>,
    next_id: u32,
    calls: Vec<String>,
    fetch_times: Vec<Instant>,
    fetch_since: Vec<Option<DateTime<Utc>>>,
    fetch_error: Option<ProviderError>,
    push_error: Option<ProviderError>,
}

/// Scripted Google-like provider holding its own copy of events.
///
/// Failures are injected per operation class; `hold_fetch` parks
/// `fetch_changed` until released so tests can observe in-flight passes.
#[derive(Default, Clone)]
pub struct ScriptedProvider {
    state: Arc<Mutex<State>>,
    gate: Arc<Mutex<Option<Gate>>>,
}

#[derive(Clone)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl ScriptedProvider {
    /// Seed or replace a provider-side event.
    pub fn put_remote(&self, id: &str, fields: EventFields, updated_at: DateTime<Utc>) {
        self.state.lock().unwrap().remote.insert(
            id.to_string(),
            ExternalEvent { id: id.to_string(), fields, updated_at, cancelled: false },
        );
    }

    /// Mark a provider-side event cancelled.
    pub fn cancel_remote(&self, id: &str, updated_at: DateTime<Utc>) {
        if let Some(event) = self.state.lock().unwrap().remote.get_mut(id) {
            event.cancelled = true;
            event.updated_at = updated_at;
        }
    }

    pub fn remove_remote(&self, id: &str) {
        self.state.lock().unwrap().remote.remove(id);
    }

    pub fn remote(&self, id: &str) -> Option<ExternalEvent> {
        self.state.lock().unwrap().remote.get(id).cloned()
    }

    pub fn remote_count(&self) -> usize {
        self.state.lock().unwrap().remote.len()
    }

    pub fn fail_fetch(&self, error: Option<ProviderError>) {
        self.state.lock().unwrap().fetch_error = error;
    }

    pub fn fail_push(&self, error: Option<ProviderError>) {
        self.state.lock().unwrap().push_error = error;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().fetch_times.clone()
    }

    pub fn fetch_since(&self) -> Vec<Option<DateTime<Utc>>> {
        self.state.lock().unwrap().fetch_since.clone()
    }

    /// Park the next `fetch_changed` call until `release` is notified.
    pub fn hold_fetch(&self) -> Gate {
        let gate = Gate { entered: Arc::new(Notify::new()), release: Arc::new(Notify::new()) };
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn record(&self, call: String) -> Option<ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state.push_error.clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    async fn create_event(
        &self,
        _connection: &CalendarConnection,
        event: &CalendarEvent,
    ) -> Result<String, ProviderError> {
        if let Some(error) = self.record("create".to_string()) {
            return Err(error);
        }
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("ext-{}", state.next_id);
        state.remote.insert(
            id.clone(),
            ExternalEvent {
                id: id.clone(),
                fields: event.fields.clone(),
                updated_at: Utc::now(),
                cancelled: false,
            },
        );
        Ok(id)
    }

    async fn update_event(
        &self,
        _connection: &CalendarConnection,
        external_id: &str,
        event: &CalendarEvent,
    ) -> Result<(), ProviderError> {
        if let Some(error) = self.record(format!("update:{external_id}")) {
            return Err(error);
        }
        let mut state = self.state.lock().unwrap();
        let remote = state
            .remote
            .get_mut(external_id)
            .filter(|e| !e.cancelled)
            .ok_or_else(|| ProviderError::NotFound(external_id.to_string()))?;
        remote.fields = event.fields.clone();
        remote.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_event(
        &self,
        _connection: &CalendarConnection,
        external_id: &str,
    ) -> Result<(), ProviderError> {
        if let Some(error) = self.record(format!("delete:{external_id}")) {
            return Err(error);
        }
        match self.state.lock().unwrap().remote.remove(external_id) {
            Some(_) => Ok(()),
            None => Err(ProviderError::NotFound(external_id.to_string())),
        }
    }

    async fn fetch_changed(
        &self,
        _connection: &CalendarConnection,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ExternalEvent>, ProviderError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        state.calls.push("fetch".to_string());
        state.fetch_times.push(Instant::now());
        state.fetch_since.push(since);
        if let Some(error) = state.fetch_error.clone() {
            return Err(error);
        }
        Ok(state
            .remote
            .values()
            .filter(|e| since.map_or(true, |s| e.updated_at >= s))
            .cloned()
            .collect())
    }

    fn to_canonical(
        &self,
        connection: &CalendarConnection,
        external: &ExternalEvent,
    ) -> Result<CalendarEvent, ProviderError> {
        Ok(CalendarEvent::from_provider(
            connection,
            external.id.clone(),
            external.fields.clone(),
            external.updated_at,
        ))
    }
}
