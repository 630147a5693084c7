//! Classifies divergence between a local event and its provider copy and
//! applies the connection's conflict strategy.
//!
//! Classification compares each side's modification instant with the
//! event's last successful sync:
//!
//! | local changed | external changed | classification |
//! |---------------|------------------|----------------|
//! | no            | no               | `NoOp`         |
//! | yes           | no               | `LocalOnly`    |
//! | no            | yes              | `ExternalOnly` |
//! | yes           | yes              | `Conflict`     |
//!
//! Identical comparable fields are always `NoOp`, whatever the timestamps
//! say. A missing sync instant counts as "changed".

use std::sync::Arc;

use caresync_domain::{
    CalendarEvent, CareSyncError, ConflictField, ConflictSnapshot, ConflictStrategy, EventFields,
    ManualResolution, MergePolicy, MergeSide, ResolutionLabel, Result, SnapshotSide, SyncStatus,
};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::integrity::IntegrityManager;

/// How an event pair diverged since the last sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    NoOp,
    LocalOnly,
    ExternalOnly,
    Conflict { fields: Vec<ConflictField> },
}

/// Outcome of resolving one event pair
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The event to persist
    pub event: CalendarEvent,
    /// 1.0 for deterministic outcomes, lower for partial merges, 0.0 when a
    /// human must decide
    pub confidence: f32,
    pub label: Option<ResolutionLabel>,
    /// Fields that differed between the two sides (display and audit only)
    pub differing_fields: Vec<ConflictField>,
    pub classification: Classification,
}

impl Resolution {
    /// `true` when nothing needs to be written
    pub fn is_noop(&self) -> bool {
        self.classification == Classification::NoOp
    }

    /// `true` when the event was parked for a human decision
    pub fn needs_review(&self) -> bool {
        self.event.sync_status() == SyncStatus::Conflict
    }
}

pub struct ConflictResolver {
    integrity: Arc<IntegrityManager>,
    merge_policy: MergePolicy,
}

impl ConflictResolver {
    pub fn new(integrity: Arc<IntegrityManager>, merge_policy: MergePolicy) -> Self {
        Self { integrity, merge_policy }
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.merge_policy
    }

    pub fn classify(
        &self,
        local: &CalendarEvent,
        external: &CalendarEvent,
        last_synced: Option<DateTime<Utc>>,
    ) -> Classification {
        let fields = local.fields.differing_fields(&external.fields);
        if fields.is_empty() {
            return Classification::NoOp;
        }

        let changed_since = |at: Option<DateTime<Utc>>| match (at, last_synced) {
            (Some(at), Some(synced)) => at > synced,
            _ => true,
        };
        let local_changed = changed_since(Some(local.local_modified_at));
        let external_changed = changed_since(external.external_modified_at);

        match (local_changed, external_changed) {
            (false, false) => Classification::NoOp,
            (true, false) => Classification::LocalOnly,
            (false, true) => Classification::ExternalOnly,
            (true, true) => Classification::Conflict { fields },
        }
    }

    /// Classify the pair and apply `strategy` when both sides changed.
    ///
    /// `external` must already be sanitized and range-checked.
    pub async fn resolve(
        &self,
        local: &CalendarEvent,
        external: &CalendarEvent,
        strategy: ConflictStrategy,
        last_synced: Option<DateTime<Utc>>,
    ) -> Result<Resolution> {
        let now = Utc::now();
        let classification = self.classify(local, external, last_synced);
        let differing_fields = local.fields.differing_fields(&external.fields);
        let mut event = local.clone();

        let (confidence, label) = match &classification {
            Classification::NoOp => {
                return Ok(Resolution {
                    event,
                    confidence: 1.0,
                    label: None,
                    differing_fields,
                    classification,
                });
            }
            Classification::LocalOnly => {
                event.set_status(SyncStatus::PendingPush)?;
                (1.0, None)
            }
            Classification::ExternalOnly => {
                event.fields = external.fields.clone();
                event.mark_synced(now)?;
                (1.0, None)
            }
            Classification::Conflict { fields } => match strategy {
                ConflictStrategy::LocalWins => {
                    event.set_status(SyncStatus::PendingPush)?;
                    event.local_modified_at = now;
                    (1.0, Some(ResolutionLabel::LocalWins))
                }
                ConflictStrategy::ExternalWins => {
                    event.fields = external.fields.clone();
                    event.mark_synced(now)?;
                    (1.0, Some(ResolutionLabel::ExternalWins))
                }
                ConflictStrategy::Merge => {
                    event.fields = merge_fields(&local.fields, &external.fields, self.merge_policy);
                    event.set_status(SyncStatus::PendingPush)?;
                    event.local_modified_at = now;
                    (merge_confidence(fields), Some(ResolutionLabel::Merged))
                }
                ConflictStrategy::Manual => {
                    let snapshot = ConflictSnapshot {
                        local: SnapshotSide {
                            fields: local.fields.clone(),
                            modified_at: Some(local.local_modified_at),
                        },
                        external: SnapshotSide {
                            fields: external.fields.clone(),
                            modified_at: external.external_modified_at,
                        },
                        baseline: local.synced_fields.clone(),
                        differing_fields: fields.clone(),
                    };
                    let sealed = self.integrity.encrypt_conflict_snapshot(&snapshot).await?;
                    event.enter_conflict(sealed, now)?;
                    (0.0, None)
                }
            },
        };

        event.external_modified_at = external.external_modified_at.or(event.external_modified_at);
        if label.is_some() {
            event.conflict_detected_at = Some(now);
            event.conflict_resolved_at = Some(now);
            event.resolution = label;
        }
        self.integrity.seal(&mut event).await?;

        debug!(
            event_id = %event.id,
            ?classification,
            ?strategy,
            confidence,
            "Event pair resolved"
        );

        Ok(Resolution { event, confidence, label, differing_fields, classification })
    }

    /// Settle an event parked in `conflict` with a user decision.
    ///
    /// `snapshot` is `None` when it could not be decrypted. `keep_local` and
    /// `discard` still succeed in that case; `keep_external` and `merge` need
    /// the external side and fail with an integrity error.
    pub async fn apply_manual(
        &self,
        event: &CalendarEvent,
        snapshot: Option<&ConflictSnapshot>,
        resolution: ManualResolution,
    ) -> Result<Resolution> {
        let now = Utc::now();
        let mut resolved = event.clone();
        let label = ResolutionLabel::from(resolution);

        match resolution {
            ManualResolution::KeepLocal => {
                resolved.leave_conflict(SyncStatus::PendingPush, label, now)?;
                resolved.local_modified_at = now;
            }
            ManualResolution::KeepExternal => {
                let snapshot = require_snapshot(snapshot, resolution)?;
                resolved.fields = snapshot.external.fields.clone();
                resolved.leave_conflict(SyncStatus::Synced, label, now)?;
                resolved.last_synced_at = Some(now);
                resolved.synced_fields = Some(resolved.fields.clone());
                resolved.external_modified_at = snapshot.external.modified_at;
                resolved.error_code = None;
            }
            ManualResolution::Merge => {
                let snapshot = require_snapshot(snapshot, resolution)?;
                resolved.fields =
                    merge_fields(&event.fields, &snapshot.external.fields, self.merge_policy);
                resolved.leave_conflict(SyncStatus::PendingPush, label, now)?;
                resolved.local_modified_at = now;
            }
            ManualResolution::Discard => {
                let baseline = snapshot
                    .and_then(|s| s.baseline.clone())
                    .or_else(|| event.synced_fields.clone());
                if let Some(baseline) = baseline {
                    resolved.fields = baseline;
                }
                resolved.leave_conflict(SyncStatus::PendingPush, label, now)?;
                resolved.local_modified_at = now;
            }
        }

        self.integrity.seal(&mut resolved).await?;

        let differing_fields = snapshot.map(|s| s.differing_fields.clone()).unwrap_or_default();
        Ok(Resolution {
            event: resolved,
            confidence: 1.0,
            label: Some(label),
            classification: Classification::Conflict { fields: differing_fields.clone() },
            differing_fields,
        })
    }
}

/// Combine two field sets by category: content (title, description) and
/// schedule (start, end, all-day, location).
pub fn merge_fields(local: &EventFields, external: &EventFields, policy: MergePolicy) -> EventFields {
    let content = match policy.content {
        MergeSide::Local => local,
        MergeSide::External => external,
    };
    let schedule = match policy.schedule {
        MergeSide::Local => local,
        MergeSide::External => external,
    };
    EventFields {
        title: content.title.clone(),
        description: content.description.clone(),
        start: schedule.start,
        end: schedule.end,
        all_day: schedule.all_day,
        location: schedule.location.clone(),
    }
}

fn merge_confidence(fields: &[ConflictField]) -> f32 {
    let content = fields.iter().any(|f| f.is_content());
    let schedule = fields.iter().any(|f| !f.is_content());
    if content && schedule {
        0.75
    } else {
        1.0
    }
}

fn require_snapshot(
    snapshot: Option<&ConflictSnapshot>,
    resolution: ManualResolution,
) -> Result<&ConflictSnapshot> {
    snapshot.ok_or_else(|| {
        CareSyncError::Integrity(format!("conflict snapshot unavailable for {resolution}"))
    })
}
