//! Sync orchestrator: the single mutation path for connections and events.
//!
//! Every entry point (periodic `sync_all`, on-demand `sync_connection`,
//! manual `resolve_conflict`, local edits) runs through this type. A
//! per-connection in-flight set keeps two mutations of one connection from
//! overlapping; `sync_all` has its own re-entrancy flag and drops a second
//! concurrent call instead of queueing it.
//!
//! A pass runs in fixed order: integrity sweep, push, push-deletion, pull,
//! commit. `last_sync_at` advances only on commit, to the instant captured
//! before the pass began, so a failed or cancelled pass re-examines the same
//! window next time.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use caresync_common::resilience::policies::ClassifiedRetry;
use caresync_common::{RetryConfig, RetryError, RetryExecutor};
use caresync_domain::constants::CODE_INTEGRITY_MISMATCH;
use caresync_domain::{
    CalendarConnection, CalendarEvent, CareSyncError, ConnectionStatus, ExternalEvent,
    ExternalId, ManualResolution, NewConnection, ProviderError, SnapshotSide, SyncConfig,
    SyncOutcome, SyncStatus,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::errors::SyncError;
use super::ports::{AuditEvent, AuditSink, CalendarStore, MetadataMirror};
use super::report::{PassReport, SyncAllReport};
use crate::calendar_ports::{ProviderAdapter, ProviderRegistry};
use crate::conflict::{Classification, ConflictResolver};
use crate::credential_ports::CredentialStore;
use crate::integrity::{IntegrityCheck, IntegrityManager};
use crate::validation::{check_range, sanitize_fields};

/// Code recorded when a connection is disabled on request.
const CODE_DISCONNECTED: &str = "disconnected";

/// Collaborators the orchestrator drives.
#[derive(Clone)]
pub struct SyncDependencies {
    pub store: Arc<dyn CalendarStore>,
    pub providers: Arc<dyn ProviderRegistry>,
    pub mirror: Arc<dyn MetadataMirror>,
    pub audit: Arc<dyn AuditSink>,
    pub credentials: Arc<dyn CredentialStore>,
}

pub struct SyncOrchestrator {
    store: Arc<dyn CalendarStore>,
    providers: Arc<dyn ProviderRegistry>,
    mirror: Arc<dyn MetadataMirror>,
    audit: Arc<dyn AuditSink>,
    credentials: Arc<dyn CredentialStore>,
    integrity: Arc<IntegrityManager>,
    resolver: ConflictResolver,
    retry: RetryExecutor<ClassifiedRetry>,
    config: SyncConfig,
    in_flight: Mutex<HashSet<Uuid>>,
    sync_all_running: AtomicBool,
    shutdown: CancellationToken,
}

impl SyncOrchestrator {
    pub fn new(deps: SyncDependencies, config: SyncConfig) -> caresync_domain::Result<Self> {
        config.validate()?;

        let retry_config = RetryConfig::builder()
            .max_attempts(config.max_attempts)
            .exponential_backoff(
                Duration::from_millis(config.initial_backoff_ms),
                config.backoff_multiplier,
                Duration::from_millis(config.max_backoff_ms),
            )
            .backoff_after_final_attempt(true)
            .build()
            .map_err(|e| CareSyncError::Config(e.to_string()))?;

        let integrity = Arc::new(IntegrityManager::new(Arc::clone(&deps.credentials)));
        let resolver = ConflictResolver::new(Arc::clone(&integrity), config.merge_policy);

        Ok(Self {
            store: deps.store,
            providers: deps.providers,
            mirror: deps.mirror,
            audit: deps.audit,
            credentials: deps.credentials,
            integrity,
            resolver,
            retry: RetryExecutor::new(retry_config, ClassifiedRetry),
            config,
            in_flight: Mutex::new(HashSet::new()),
            sync_all_running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn integrity(&self) -> &Arc<IntegrityManager> {
        &self.integrity
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Cancel every running and future pass started through this instance.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    // ------------------------------------------------------------------
    // Sync passes
    // ------------------------------------------------------------------

    /// Sync every non-disabled connection, one at a time, in store order.
    ///
    /// Returns `None` without doing anything when another `sync_all` is
    /// already running.
    #[instrument(skip(self))]
    pub async fn sync_all(&self) -> Option<SyncAllReport> {
        if self
            .sync_all_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("sync_all already running; skipping");
            return None;
        }
        let _running = FlagGuard(&self.sync_all_running);

        let mut report = SyncAllReport::default();
        let connections = match self.store.list_connections().await {
            Ok(connections) => connections,
            Err(e) => {
                error!(error = %e, "Failed to enumerate connections");
                return Some(report);
            }
        };

        for connection in connections {
            if !connection.is_syncable() {
                report.skipped += 1;
                continue;
            }
            if self.shutdown.is_cancelled() {
                debug!("Shutdown requested; stopping sync_all");
                break;
            }
            let result = self.sync_connection(connection.id).await;
            report.results.push((connection.id, result));
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped,
            "sync_all finished"
        );
        Some(report)
    }

    pub async fn sync_connection(&self, id: Uuid) -> Result<PassReport, SyncError> {
        let cancel = self.shutdown.child_token();
        self.sync_connection_with(id, &cancel).await
    }

    /// Run one sync pass with retries, honouring `cancel` before each
    /// attempt, between events and during backoff.
    #[instrument(skip(self, cancel), fields(connection_id = %id))]
    pub async fn sync_connection_with(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<PassReport, SyncError> {
        let _guard = self.claim(id)?;
        let connection = self.load_connection(id).await?;
        if !connection.is_syncable() {
            return Err(SyncError::ConnectionDisabled(id));
        }

        let adapter = self.adapter_for(&connection)?;
        let connection_ref = &connection;
        let adapter_ref = adapter.as_ref();

        let outcome = self
            .retry
            .execute(cancel, move |attempt| {
                self.run_pass(connection_ref, adapter_ref, cancel, attempt)
            })
            .await;
        let attempts = outcome.attempts;

        match outcome.result {
            Ok((mut report, started_at)) => {
                report.attempts = attempts;
                self.commit_success(connection, &report, started_at).await?;
                Ok(report)
            }
            Err(RetryError::Cancelled { attempts }) => {
                info!(attempts, "Sync pass cancelled");
                Err(SyncError::Cancelled)
            }
            Err(RetryError::NonRetryable { source: SyncError::Cancelled, attempts }) => {
                info!(attempts, "Sync pass cancelled");
                Err(SyncError::Cancelled)
            }
            Err(RetryError::NonRetryable { source, attempts }) if source.is_unauthorized() => {
                self.record_unauthorized(connection, source.code(), attempts).await;
                Err(source)
            }
            Err(RetryError::NonRetryable { source, attempts }) => {
                self.record_failure(connection, source.code(), attempts).await;
                Err(source)
            }
            Err(RetryError::AttemptsExhausted { attempts, last }) => {
                self.record_failure(connection, last.code(), attempts).await;
                Err(SyncError::RetriesExhausted { attempts, last: Box::new(last) })
            }
            Err(RetryError::InvalidConfiguration { message }) => Err(SyncError::InvalidState(message)),
        }
    }

    async fn run_pass(
        &self,
        connection: &CalendarConnection,
        adapter: &dyn ProviderAdapter,
        cancel: &CancellationToken,
        attempt: u32,
    ) -> Result<(PassReport, DateTime<Utc>), SyncError> {
        let started_at = Utc::now();
        let mut report = PassReport::new(connection.id);
        debug!(connection_id = %connection.id, attempt, "Sync pass started");

        self.integrity_sweep(connection, &mut report).await?;

        if connection.direction.pushes() {
            self.push_phase(connection, adapter, cancel, &mut report).await?;
            self.deletion_phase(connection, adapter, cancel, &mut report).await?;
        } else {
            self.drop_local_deletions(connection, cancel, &mut report).await?;
        }

        if connection.direction.pulls() {
            self.pull_phase(connection, adapter, cancel, &mut report).await?;
        }

        Ok((report, started_at))
    }

    /// Verify checksums of events about to be pushed or deleted.
    async fn integrity_sweep(
        &self,
        connection: &CalendarConnection,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let events = self.store.list_events(connection.id, None).await?;

        for mut event in events {
            let status = event.sync_status();
            if !matches!(status, SyncStatus::PendingPush | SyncStatus::Deleted) {
                continue;
            }

            match self.integrity.check_event(&event).await {
                Ok(IntegrityCheck::Valid) => {}
                Ok(IntegrityCheck::Unsealed) => {
                    self.integrity.seal(&mut event).await?;
                    self.store.upsert_event(&event).await?;
                }
                Ok(IntegrityCheck::Mismatch) => {
                    report.integrity_mismatches += 1;
                    warn!(event_id = %event.id, status = %status, "Event checksum mismatch");
                    self.audit
                        .record(AuditEvent::IntegrityMismatch {
                            connection_id: connection.id,
                            event_id: event.id,
                        })
                        .await;

                    if status == SyncStatus::PendingPush {
                        if event.external_id.is_linked() {
                            // Untrusted local copy; the next pull overwrites it.
                            event.set_status(SyncStatus::PendingPull)?;
                        } else {
                            event.mark_error(CODE_INTEGRITY_MISMATCH)?;
                            report.event_errors += 1;
                        }
                        self.store.upsert_event(&event).await?;
                    }
                }
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "Integrity check unavailable");
                }
            }
        }
        Ok(())
    }

    async fn push_phase(
        &self,
        connection: &CalendarConnection,
        adapter: &dyn ProviderAdapter,
        cancel: &CancellationToken,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let pending = self.store.list_events(connection.id, Some(SyncStatus::PendingPush)).await?;

        for mut event in pending {
            check_cancelled(cancel)?;

            if let Err(err) = check_range(&event.fields, self.config.max_event_span_days) {
                self.flag_event(&mut event, err.code(), report).await?;
                continue;
            }

            let pushed = match event.external_id.clone() {
                ExternalId::NotYetCreated => {
                    adapter.create_event(connection, &event).await.map(Some)
                }
                ExternalId::Linked(external_id) => {
                    match adapter.update_event(connection, &external_id, &event).await {
                        Ok(()) => Ok(None),
                        Err(ProviderError::NotFound(_)) => {
                            debug!(event_id = %event.id, "Provider copy vanished; recreating");
                            adapter.create_event(connection, &event).await.map(Some)
                        }
                        Err(e) => Err(e),
                    }
                }
            };

            match pushed {
                Ok(created) => {
                    if let Some(external_id) = created {
                        event.external_id = ExternalId::Linked(external_id);
                        report.created += 1;
                    }
                    event.mark_synced(Utc::now())?;
                    self.integrity.seal(&mut event).await?;
                    self.store.upsert_event(&event).await?;
                    report.pushed += 1;
                }
                Err(e) if is_pass_level(&e) => return Err(e.into()),
                Err(e) => self.flag_event(&mut event, e.code(), report).await?,
            }
        }
        Ok(())
    }

    async fn deletion_phase(
        &self,
        connection: &CalendarConnection,
        adapter: &dyn ProviderAdapter,
        cancel: &CancellationToken,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let deleted = self.store.list_events(connection.id, Some(SyncStatus::Deleted)).await?;

        for event in deleted {
            check_cancelled(cancel)?;

            if let Some(external_id) = event.external_id.as_linked() {
                match adapter.delete_event(connection, external_id).await {
                    Ok(()) | Err(ProviderError::NotFound(_)) => {}
                    Err(e) if is_pass_level(&e) => return Err(e.into()),
                    Err(e) => {
                        warn!(event_id = %event.id, code = e.code(), "Provider delete failed");
                        report.event_errors += 1;
                        continue;
                    }
                }
            }

            self.store.delete_event(event.id).await?;
            report.deleted += 1;
        }
        Ok(())
    }

    /// Pull-only connections never write to the provider; local deletions
    /// are simply dropped.
    async fn drop_local_deletions(
        &self,
        connection: &CalendarConnection,
        cancel: &CancellationToken,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let deleted = self.store.list_events(connection.id, Some(SyncStatus::Deleted)).await?;
        for event in deleted {
            check_cancelled(cancel)?;
            self.store.delete_event(event.id).await?;
            report.deleted += 1;
        }
        Ok(())
    }

    async fn pull_phase(
        &self,
        connection: &CalendarConnection,
        adapter: &dyn ProviderAdapter,
        cancel: &CancellationToken,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let awaiting_pull =
            !self.store.list_events(connection.id, Some(SyncStatus::PendingPull)).await?.is_empty();
        let since = if awaiting_pull { None } else { connection.last_sync_at };

        check_cancelled(cancel)?;
        let changes = adapter.fetch_changed(connection, since).await?;
        debug!(connection_id = %connection.id, count = changes.len(), full = since.is_none(), "Fetched provider changes");

        for external in changes {
            check_cancelled(cancel)?;
            self.apply_pulled(connection, adapter, &external, report).await?;
        }
        Ok(())
    }

    async fn apply_pulled(
        &self,
        connection: &CalendarConnection,
        adapter: &dyn ProviderAdapter,
        external: &ExternalEvent,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let local = self.store.find_event_by_external_id(connection.id, &external.id).await?;

        if external.cancelled {
            if let Some(local) = local {
                self.apply_external_cancellation(local, report).await?;
            }
            return Ok(());
        }

        let mut incoming = match adapter.to_canonical(connection, external) {
            Ok(event) => event,
            Err(ProviderError::InvalidDateRange(_)) => {
                return self.reject_external(connection, external, report).await;
            }
            Err(e) => {
                warn!(external_id = %external.id, code = e.code(), "Provider event not mapped");
                report.event_errors += 1;
                return Ok(());
            }
        };
        sanitize_fields(&mut incoming.fields);
        if check_range(&incoming.fields, self.config.max_event_span_days).is_err() {
            return self.reject_external(connection, external, report).await;
        }
        incoming.synced_fields = Some(incoming.fields.clone());

        let Some(mut local) = local else {
            self.integrity.seal(&mut incoming).await?;
            self.store.upsert_event(&incoming).await?;
            report.pulled += 1;
            return Ok(());
        };

        match local.sync_status() {
            SyncStatus::Deleted => Ok(()),
            SyncStatus::PendingPull => {
                local.fields = incoming.fields;
                local.external_modified_at = incoming.external_modified_at;
                local.mark_synced(Utc::now())?;
                self.integrity.seal(&mut local).await?;
                self.store.upsert_event(&local).await?;
                report.pulled += 1;
                Ok(())
            }
            SyncStatus::Conflict => self.refresh_conflict(local, &incoming, report).await,
            _ => self.resolve_pulled(connection, local, &incoming, report).await,
        }
    }

    async fn resolve_pulled(
        &self,
        connection: &CalendarConnection,
        mut local: CalendarEvent,
        incoming: &CalendarEvent,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let resolution = match self
            .resolver
            .resolve(&local, incoming, connection.strategy, local.last_synced_at)
            .await
        {
            Ok(resolution) => resolution,
            Err(e) => {
                let err = SyncError::from(e);
                warn!(event_id = %local.id, code = err.code(), "Conflict resolution failed");
                self.flag_event(&mut local, err.code(), report).await?;
                return Ok(());
            }
        };

        if resolution.is_noop() {
            return Ok(());
        }
        self.store.upsert_event(&resolution.event).await?;

        match &resolution.classification {
            Classification::ExternalOnly => report.pulled += 1,
            Classification::Conflict { fields } if resolution.needs_review() => {
                report.conflicts += 1;
                self.audit
                    .record(AuditEvent::ConflictDetected {
                        connection_id: connection.id,
                        event_id: resolution.event.id,
                        fields: fields.clone(),
                    })
                    .await;
            }
            Classification::Conflict { .. } => {
                report.resolved_automatically += 1;
                if let Some(label) = resolution.label {
                    self.audit
                        .record(AuditEvent::ConflictResolved {
                            connection_id: connection.id,
                            event_id: resolution.event.id,
                            resolution: label,
                            confidence: resolution.confidence,
                        })
                        .await;
                }
            }
            Classification::LocalOnly | Classification::NoOp => {}
        }
        Ok(())
    }

    /// Replace the external side of a parked conflict with the latest
    /// provider values.
    async fn refresh_conflict(
        &self,
        mut local: CalendarEvent,
        incoming: &CalendarEvent,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        let Some(sealed) = local.conflict_snapshot() else {
            return Ok(());
        };
        let mut snapshot = match self.integrity.decrypt_conflict_snapshot(sealed).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(event_id = %local.id, error = %e, "Conflict snapshot unrecoverable; not refreshed");
                return Ok(());
            }
        };
        if snapshot.external.fields == incoming.fields {
            return Ok(());
        }

        snapshot.external =
            SnapshotSide { fields: incoming.fields.clone(), modified_at: incoming.external_modified_at };
        snapshot.differing_fields = snapshot.local.fields.differing_fields(&snapshot.external.fields);

        let resealed = self.integrity.encrypt_conflict_snapshot(&snapshot).await?;
        let detected_at = local.conflict_detected_at.unwrap_or_else(Utc::now);
        local.enter_conflict(resealed, detected_at)?;
        local.external_modified_at = incoming.external_modified_at;
        self.store.upsert_event(&local).await?;
        report.pulled += 1;
        Ok(())
    }

    async fn apply_external_cancellation(
        &self,
        mut local: CalendarEvent,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        match local.sync_status() {
            SyncStatus::Conflict | SyncStatus::Deleted => Ok(()),
            // A pending-pull copy failed verification and is not worth keeping.
            status if status != SyncStatus::PendingPull && local.has_unsynced_changes() => {
                // Local edits survive; the event is recreated on the next push.
                local.external_id = ExternalId::NotYetCreated;
                local.set_status(SyncStatus::PendingPush)?;
                self.store.upsert_event(&local).await?;
                report.pulled += 1;
                Ok(())
            }
            _ => {
                self.store.delete_event(local.id).await?;
                report.pulled += 1;
                Ok(())
            }
        }
    }

    async fn reject_external(
        &self,
        connection: &CalendarConnection,
        external: &ExternalEvent,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        report.rejected += 1;
        warn!(external_id = %external.id, "Rejected provider event with invalid date range");
        self.audit
            .record(AuditEvent::ExternalRangeRejected {
                connection_id: connection.id,
                external_id: external.id.clone(),
            })
            .await;
        Ok(())
    }

    /// Mark one event `error` without failing the pass.
    async fn flag_event(
        &self,
        event: &mut CalendarEvent,
        code: &str,
        report: &mut PassReport,
    ) -> Result<(), SyncError> {
        if event.sync_status() == SyncStatus::Conflict {
            return Ok(());
        }
        warn!(event_id = %event.id, code, "Event sync failed");
        event.mark_error(code)?;
        self.integrity.seal(event).await?;
        self.store.upsert_event(event).await?;
        report.event_errors += 1;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    async fn commit_success(
        &self,
        mut connection: CalendarConnection,
        report: &PassReport,
        started_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        connection.last_sync_at = Some(started_at);
        connection.last_sync_outcome = Some(SyncOutcome::Success);
        connection.status = ConnectionStatus::Active;
        connection.consecutive_failures = 0;
        connection.last_error_code = None;
        connection.updated_at = Utc::now();

        self.store.update_connection(&connection).await?;
        self.mirror_update(&connection).await;
        self.audit
            .record(AuditEvent::PassCompleted {
                connection_id: connection.id,
                pushed: report.pushed,
                pulled: report.pulled,
                conflicts: report.conflicts,
                attempts: report.attempts,
            })
            .await;

        info!(
            connection_id = %connection.id,
            pushed = report.pushed,
            deleted = report.deleted,
            pulled = report.pulled,
            conflicts = report.conflicts,
            rejected = report.rejected,
            attempts = report.attempts,
            "Sync pass committed"
        );
        Ok(())
    }

    /// The fault is external and may clear on its own, so the connection
    /// stays active.
    async fn record_unauthorized(&self, mut connection: CalendarConnection, code: &str, attempts: u32) {
        connection.last_sync_outcome = Some(SyncOutcome::Unauthorized);
        connection.last_error_code = Some(code.to_string());
        connection.updated_at = Utc::now();
        warn!(connection_id = %connection.id, "Provider rejected credentials");

        self.persist_after_failure(&connection).await;
        self.audit
            .record(AuditEvent::PassFailed {
                connection_id: connection.id,
                code: code.to_string(),
                attempts,
            })
            .await;
    }

    async fn record_failure(&self, mut connection: CalendarConnection, code: &str, attempts: u32) {
        connection.consecutive_failures = connection.consecutive_failures.saturating_add(1);
        connection.last_sync_outcome = Some(SyncOutcome::Failed);
        connection.last_error_code = Some(code.to_string());
        connection.updated_at = Utc::now();

        let disable = connection.consecutive_failures >= self.config.max_consecutive_failures;
        connection.status = if disable { ConnectionStatus::Disabled } else { ConnectionStatus::Error };
        warn!(
            connection_id = %connection.id,
            code,
            attempts,
            failures = connection.consecutive_failures,
            status = %connection.status,
            "Sync pass failed"
        );

        self.persist_after_failure(&connection).await;
        self.audit
            .record(AuditEvent::PassFailed {
                connection_id: connection.id,
                code: code.to_string(),
                attempts,
            })
            .await;
        if disable {
            self.audit
                .record(AuditEvent::ConnectionDisabled {
                    connection_id: connection.id,
                    code: code.to_string(),
                })
                .await;
        }
    }

    async fn persist_after_failure(&self, connection: &CalendarConnection) {
        if let Err(e) = self.store.update_connection(connection).await {
            error!(connection_id = %connection.id, error = %e, "Failed to record pass failure");
        }
        self.mirror_update(connection).await;
    }

    async fn mirror_update(&self, connection: &CalendarConnection) {
        if let Err(e) = self.mirror.update_connection(connection).await {
            warn!(connection_id = %connection.id, error = %e, "Metadata mirror update failed");
        }
    }

    // ------------------------------------------------------------------
    // Conflicts and local edits
    // ------------------------------------------------------------------

    /// Apply a user decision to an event parked in `conflict`.
    #[instrument(skip(self))]
    pub async fn resolve_conflict(
        &self,
        event_id: Uuid,
        resolution: ManualResolution,
    ) -> Result<CalendarEvent, SyncError> {
        let connection_id = self.load_event(event_id).await?.connection_id;
        let _guard = self.claim(connection_id)?;
        let event = self.load_event(event_id).await?;

        let Some(sealed) = event.conflict_snapshot() else {
            return Err(SyncError::InvalidState(format!("event {event_id} is not in conflict")));
        };
        let snapshot = match self.integrity.decrypt_conflict_snapshot(sealed).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "Conflict snapshot unrecoverable");
                None
            }
        };

        let resolved = self.resolver.apply_manual(&event, snapshot.as_ref(), resolution).await?;
        self.store.upsert_event(&resolved.event).await?;

        if let Some(label) = resolved.label {
            self.audit
                .record(AuditEvent::ConflictResolved {
                    connection_id: event.connection_id,
                    event_id,
                    resolution: label,
                    confidence: resolved.confidence,
                })
                .await;
        }
        info!(event_id = %event_id, %resolution, "Conflict resolved");
        Ok(resolved.event)
    }

    /// Record a local edit or creation; the event is pushed on the next pass.
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn save_local_event(&self, mut event: CalendarEvent) -> Result<CalendarEvent, SyncError> {
        let _guard = self.claim(event.connection_id)?;
        let connection = self.load_connection(event.connection_id).await?;

        event.circle_id = connection.circle_id;
        event.local_modified_at = Utc::now();
        event.set_status(SyncStatus::PendingPush)?;
        self.integrity.seal(&mut event).await?;
        self.store.upsert_event(&event).await?;
        Ok(event)
    }

    /// Mark an event deleted. Events never pushed are removed immediately.
    #[instrument(skip(self))]
    pub async fn delete_local_event(&self, event_id: Uuid) -> Result<CalendarEvent, SyncError> {
        let connection_id = self.load_event(event_id).await?.connection_id;
        let _guard = self.claim(connection_id)?;
        let mut event = self.load_event(event_id).await?;

        if !event.external_id.is_linked() {
            self.store.delete_event(event_id).await?;
            return Ok(event);
        }
        event.set_status(SyncStatus::Deleted)?;
        event.local_modified_at = Utc::now();
        self.integrity.seal(&mut event).await?;
        self.store.upsert_event(&event).await?;
        Ok(event)
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    #[instrument(skip(self, input), fields(circle_id = %input.circle_id, provider = %input.provider))]
    pub async fn connect_provider(&self, input: NewConnection) -> Result<CalendarConnection, SyncError> {
        let connection = CalendarConnection::new(input, Utc::now());
        self.adapter_for(&connection)?;

        if let Some(existing) =
            self.store.find_live_connection(connection.circle_id, connection.provider).await?
        {
            return Err(SyncError::InvalidState(format!(
                "circle already has live {} connection {}",
                connection.provider, existing.id
            )));
        }

        self.store.insert_connection(&connection).await?;
        if let Err(e) = self.mirror.insert_connection(&connection).await {
            warn!(connection_id = %connection.id, error = %e, "Metadata mirror insert failed");
        }
        self.audit
            .record(AuditEvent::ConnectionCreated {
                connection_id: connection.id,
                circle_id: connection.circle_id,
                provider: connection.provider,
            })
            .await;

        info!(connection_id = %connection.id, "Connection created");
        Ok(connection)
    }

    /// Soft-disable a connection. Its provider token is deleted once no
    /// other live connection uses the same account.
    #[instrument(skip(self))]
    pub async fn disconnect_provider(&self, id: Uuid) -> Result<CalendarConnection, SyncError> {
        let _guard = self.claim(id)?;
        let mut connection = self.load_connection(id).await?;
        if connection.status == ConnectionStatus::Disabled {
            return Ok(connection);
        }

        connection.status = ConnectionStatus::Disabled;
        connection.last_error_code = Some(CODE_DISCONNECTED.to_string());
        connection.updated_at = Utc::now();
        self.store.update_connection(&connection).await?;
        self.mirror_update(&connection).await;
        self.audit
            .record(AuditEvent::ConnectionDisabled {
                connection_id: id,
                code: CODE_DISCONNECTED.to_string(),
            })
            .await;

        let account_shared = self
            .store
            .list_connections()
            .await?
            .iter()
            .any(|c| c.id != id && c.account == connection.account && c.is_syncable());
        if !account_shared {
            if let Err(e) = self.credentials.delete_secret(&connection.account).await {
                warn!(connection_id = %id, error = %e, "Failed to delete provider token");
            }
        }

        info!(connection_id = %id, "Connection disconnected");
        Ok(connection)
    }

    // ------------------------------------------------------------------
    // Key rotation
    // ------------------------------------------------------------------

    /// Rotate the integrity key and reseal every event whose checksum held
    /// under the old key. Events already failing verification keep their
    /// stale checksum and stay flagged. Returns the number resealed.
    #[instrument(skip(self))]
    pub async fn rotate_integrity_key(&self) -> Result<usize, SyncError> {
        let mut trusted = Vec::new();
        for connection in self.store.list_connections().await? {
            for event in self.store.list_events(connection.id, None).await? {
                match self.integrity.check_event(&event).await? {
                    IntegrityCheck::Valid | IntegrityCheck::Unsealed => trusted.push(event),
                    IntegrityCheck::Mismatch => {
                        warn!(event_id = %event.id, "Not resealing event with checksum mismatch");
                    }
                }
            }
        }

        self.integrity.rotate_integrity_key().await?;
        for event in &mut trusted {
            self.integrity.seal(event).await?;
        }
        self.store.upsert_events(&trusted).await?;

        info!(resealed = trusted.len(), "Event checksums resealed");
        Ok(trusted.len())
    }

    /// Rotate the encryption key. Returns the number of conflict snapshots
    /// that can no longer be decrypted.
    #[instrument(skip(self))]
    pub async fn rotate_encryption_key(&self) -> Result<usize, SyncError> {
        let mut parked = 0;
        for connection in self.store.list_connections().await? {
            parked += self.store.list_events(connection.id, Some(SyncStatus::Conflict)).await?.len();
        }

        self.integrity.rotate_encryption_key().await?;
        if parked > 0 {
            warn!(
                unrecoverable = parked,
                "Existing conflict snapshots can no longer be decrypted; only keep_local and discard remain available"
            );
        }
        Ok(parked)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn load_connection(&self, id: Uuid) -> Result<CalendarConnection, SyncError> {
        self.store.get_connection(id).await?.ok_or(SyncError::ConnectionNotFound(id))
    }

    async fn load_event(&self, id: Uuid) -> Result<CalendarEvent, SyncError> {
        self.store.get_event(id).await?.ok_or(SyncError::EventNotFound(id))
    }

    fn adapter_for(
        &self,
        connection: &CalendarConnection,
    ) -> Result<Arc<dyn ProviderAdapter>, SyncError> {
        self.providers.adapter_for(connection).ok_or_else(|| {
            SyncError::InvalidState(format!("no adapter registered for {}", connection.provider))
        })
    }

    /// Mark `connection_id` busy. Connection and event state must be read
    /// after this returns so a concurrent writer cannot be overwritten with
    /// a stale copy.
    fn claim(&self, connection_id: Uuid) -> Result<PassGuard<'_>, SyncError> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(connection_id) {
            return Err(SyncError::PassInProgress(connection_id));
        }
        Ok(PassGuard { in_flight: &self.in_flight, connection_id })
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), SyncError> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}

/// Faults that abort the whole pass rather than a single event.
fn is_pass_level(err: &ProviderError) -> bool {
    matches!(err, ProviderError::NotAuthorized(_) | ProviderError::Unavailable(_))
}

struct PassGuard<'a> {
    in_flight: &'a Mutex<HashSet<Uuid>>,
    connection_id: Uuid,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.connection_id);
    }
}

struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
