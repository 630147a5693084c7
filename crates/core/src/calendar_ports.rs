//! Calendar provider port interfaces
//!
//! A [`ProviderAdapter`] talks to one external calendar service and
//! translates its events into canonical [`CalendarEvent`]s. It holds no sync
//! policy: classification and conflict handling live in the orchestrator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use caresync_domain::{CalendarConnection, CalendarEvent, ExternalEvent, ProviderError, ProviderKind};
use chrono::{DateTime, Utc};

/// Trait for calendar provider operations
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider this adapter speaks to
    fn kind(&self) -> ProviderKind;

    /// Create the event on the provider and return its external identifier
    async fn create_event(
        &self,
        connection: &CalendarConnection,
        event: &CalendarEvent,
    ) -> Result<String, ProviderError>;

    /// Overwrite the provider copy of an event.
    ///
    /// `ProviderError::NotFound` means the event vanished and must be
    /// recreated.
    async fn update_event(
        &self,
        connection: &CalendarConnection,
        external_id: &str,
        event: &CalendarEvent,
    ) -> Result<(), ProviderError>;

    /// Delete an event. Deleting an already-absent event succeeds.
    async fn delete_event(
        &self,
        connection: &CalendarConnection,
        external_id: &str,
    ) -> Result<(), ProviderError>;

    /// Events modified at or after `since`; `None` enumerates the whole
    /// provider window.
    async fn fetch_changed(
        &self,
        connection: &CalendarConnection,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ExternalEvent>, ProviderError>;

    /// Map a provider event to canonical form.
    ///
    /// Pure: no I/O and no store lookups. Source linkage is resolved by the
    /// caller through the external-identifier mapping.
    fn to_canonical(
        &self,
        connection: &CalendarConnection,
        external: &ExternalEvent,
    ) -> Result<CalendarEvent, ProviderError>;
}

/// Resolves the adapter that serves a connection
pub trait ProviderRegistry: Send + Sync {
    fn adapter_for(&self, connection: &CalendarConnection) -> Option<Arc<dyn ProviderAdapter>>;
}

/// Registry backed by a fixed map of provider kinds to adapters
#[derive(Default, Clone)]
pub struct StaticProviderRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl StaticProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own [`ProviderAdapter::kind`]
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        self.adapters.keys().copied()
    }
}

impl ProviderRegistry for StaticProviderRegistry {
    fn adapter_for(&self, connection: &CalendarConnection) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&connection.provider).cloned()
    }
}
