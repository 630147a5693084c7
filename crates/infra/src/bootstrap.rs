//! Wiring for a production sync engine from a loaded [`Config`].

use std::sync::Arc;

use caresync_core::{
    AuditSink, CalendarStore, CredentialStore, MetadataMirror, NoopMirror, SyncDependencies,
    SyncOrchestrator, TracingAuditSink,
};
use caresync_domain::{Config, Result};
use tracing::info;

use crate::api::RemoteMirrorClient;
use crate::database::{DbManager, SqliteCalendarStore};
use crate::integrations::calendar::build_provider_registry;
use crate::key_manager::KeychainCredentialStore;

/// Open the database, run migrations and assemble the orchestrator's
/// collaborators.
///
/// The remote mirror doubles as audit sink when `remote.base_url` is set;
/// otherwise mirroring is a no-op and audit records go to the log.
pub fn build_dependencies(config: &Config) -> Result<SyncDependencies> {
    config.validate()?;

    let db = DbManager::from_config(&config.database)?;
    db.run_migrations()?;
    let store: Arc<dyn CalendarStore> = Arc::new(SqliteCalendarStore::new(Arc::new(db)));

    let credentials: Arc<dyn CredentialStore> =
        Arc::new(KeychainCredentialStore::from_config(&config.keychain));
    let providers = Arc::new(build_provider_registry(Arc::clone(&credentials), &config.sync)?);

    let (mirror, audit): (Arc<dyn MetadataMirror>, Arc<dyn AuditSink>) =
        match RemoteMirrorClient::from_config(&config.remote, Arc::clone(&credentials))? {
            Some(client) => {
                info!("remote metadata mirror enabled");
                let client = Arc::new(client);
                (Arc::clone(&client) as Arc<dyn MetadataMirror>, client as Arc<dyn AuditSink>)
            }
            None => (Arc::new(NoopMirror), Arc::new(TracingAuditSink)),
        };

    Ok(SyncDependencies { store, providers, mirror, audit, credentials })
}

/// [`build_dependencies`] plus the orchestrator itself.
pub fn build_orchestrator(config: &Config) -> Result<Arc<SyncOrchestrator>> {
    let deps = build_dependencies(config)?;
    Ok(Arc::new(SyncOrchestrator::new(deps, config.sync.clone())?))
}
