//! Calendar provider adapters
//!
//! One [`ProviderAdapter`] per provider kind, registered in a
//! [`StaticProviderRegistry`] the orchestrator consults per connection.

pub mod google;

use std::sync::Arc;

use caresync_core::{CredentialStore, ProviderAdapter, StaticProviderRegistry};
use caresync_domain::{Result, SyncConfig};

pub use google::{GoogleCalendarAdapter, GOOGLE_CALENDAR_API_BASE};

/// Registry holding every adapter this build ships with.
pub fn build_provider_registry(
    credentials: Arc<dyn CredentialStore>,
    sync: &SyncConfig,
) -> Result<StaticProviderRegistry> {
    let google: Arc<dyn ProviderAdapter> = Arc::new(GoogleCalendarAdapter::new(credentials, sync)?);
    Ok(StaticProviderRegistry::new().with_adapter(google))
}
