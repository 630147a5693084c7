//! Calendar provider integrations

pub mod providers;

pub use providers::{build_provider_registry, GoogleCalendarAdapter, GOOGLE_CALENDAR_API_BASE};
