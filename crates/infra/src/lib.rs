//! # CareSync Infrastructure
//!
//! Infrastructure implementations of core sync ports.
//!
//! This crate contains:
//! - SQLite calendar store (rusqlite + r2d2)
//! - Keychain-backed credential store
//! - Google Calendar provider adapter
//! - Remote metadata mirror and audit client
//! - Configuration loading, tracing setup and the periodic sync scheduler
//!
//! ## Architecture
//! - Implements traits defined in `caresync-core`
//! - Contains all "impure" code (I/O, platform APIs)

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod database;
pub mod errors;
pub mod integrations;
pub mod key_manager;
pub mod observability;
pub mod scheduling;

// Re-export commonly used items
pub use api::RemoteMirrorClient;
pub use bootstrap::{build_dependencies, build_orchestrator};
pub use database::{DbManager, SqliteCalendarStore};
pub use errors::InfraError;
pub use integrations::calendar::{build_provider_registry, GoogleCalendarAdapter};
pub use key_manager::KeychainCredentialStore;
pub use observability::init_tracing;
pub use scheduling::{SchedulerError, SyncScheduler};
