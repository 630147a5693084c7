//! SQLite implementation of the [`CalendarStore`] port.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use caresync_core::CalendarStore;
use caresync_domain::{
    CalendarConnection, CalendarEvent, CareSyncError, EventFields, ExternalId, ProviderKind,
    Result, SourceLink, SyncStatus,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::manager::DbManager;
use crate::errors::InfraError;

const CONNECTION_COLUMNS: &str = "id, circle_id, provider, calendar_id, account, direction, \
     strategy, last_sync_at, last_sync_outcome, status, consecutive_failures, last_error_code, \
     created_at, updated_at";

const EVENT_COLUMNS: &str = "id, connection_id, circle_id, source_kind, source_id, external_id, \
     title, description, start_at, end_at, all_day, location, sync_status, local_modified_at, \
     external_modified_at, last_synced_at, synced_fields, checksum, conflict_snapshot, \
     conflict_detected_at, conflict_resolved_at, resolution, error_code, created_at";

/// Calendar store persisting connections and events in SQLite
pub struct SqliteCalendarStore {
    db: Arc<DbManager>,
}

impl SqliteCalendarStore {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Run `op` on a pooled connection off the async runtime.
    async fn with_connection<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db.get_connection()?;
            op(&mut *conn)
        })
        .await
        .map_err(|e| CareSyncError::Internal(format!("store task failed: {e}")))?
    }
}

#[async_trait]
impl CalendarStore for SqliteCalendarStore {
    #[instrument(skip(self))]
    async fn list_connections(&self) -> Result<Vec<CalendarConnection>> {
        self.with_connection(|conn| {
            let sql = format!(
                "SELECT {CONNECTION_COLUMNS} FROM calendar_connections ORDER BY created_at, id"
            );
            let mut stmt = conn.prepare(&sql).map_err(InfraError::from)?;
            let rows = stmt
                .query_map([], connection_from_row)
                .map_err(InfraError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(InfraError::from)?;
            Ok(rows)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_connection(&self, id: Uuid) -> Result<Option<CalendarConnection>> {
        self.with_connection(move |conn| {
            let sql = format!("SELECT {CONNECTION_COLUMNS} FROM calendar_connections WHERE id = ?1");
            let connection = conn
                .query_row(&sql, [id.to_string()], connection_from_row)
                .optional()
                .map_err(InfraError::from)?;
            Ok(connection)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn find_live_connection(
        &self,
        circle_id: Uuid,
        provider: ProviderKind,
    ) -> Result<Option<CalendarConnection>> {
        self.with_connection(move |conn| {
            let sql = format!(
                "SELECT {CONNECTION_COLUMNS} FROM calendar_connections
                 WHERE circle_id = ?1 AND provider = ?2 AND status != 'disabled'
                 LIMIT 1"
            );
            let connection = conn
                .query_row(
                    &sql,
                    [circle_id.to_string(), provider.to_string()],
                    connection_from_row,
                )
                .optional()
                .map_err(InfraError::from)?;
            Ok(connection)
        })
        .await
    }

    #[instrument(skip(self, connection), fields(connection_id = %connection.id))]
    async fn insert_connection(&self, connection: &CalendarConnection) -> Result<()> {
        let connection = connection.clone();
        self.with_connection(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO calendar_connections ({CONNECTION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    connection.id.to_string(),
                    connection.circle_id.to_string(),
                    connection.provider.to_string(),
                    connection.calendar_id,
                    connection.account,
                    connection.direction.to_string(),
                    connection.strategy.to_string(),
                    connection.last_sync_at.map(to_micros),
                    connection.last_sync_outcome.map(|o| o.to_string()),
                    connection.status.to_string(),
                    connection.consecutive_failures,
                    connection.last_error_code,
                    to_micros(connection.created_at),
                    to_micros(connection.updated_at),
                ],
            )
            .map_err(InfraError::from)?;

            debug!(connection_id = %connection.id, "inserted calendar connection");
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, connection), fields(connection_id = %connection.id))]
    async fn update_connection(&self, connection: &CalendarConnection) -> Result<()> {
        let connection = connection.clone();
        self.with_connection(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE calendar_connections SET
                        calendar_id = ?2, account = ?3, direction = ?4, strategy = ?5,
                        last_sync_at = ?6, last_sync_outcome = ?7, status = ?8,
                        consecutive_failures = ?9, last_error_code = ?10, updated_at = ?11
                     WHERE id = ?1",
                    params![
                        connection.id.to_string(),
                        connection.calendar_id,
                        connection.account,
                        connection.direction.to_string(),
                        connection.strategy.to_string(),
                        connection.last_sync_at.map(to_micros),
                        connection.last_sync_outcome.map(|o| o.to_string()),
                        connection.status.to_string(),
                        connection.consecutive_failures,
                        connection.last_error_code,
                        to_micros(connection.updated_at),
                    ],
                )
                .map_err(InfraError::from)?;

            if updated == 0 {
                return Err(CareSyncError::NotFound(format!("connection {}", connection.id)));
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_event(&self, id: Uuid) -> Result<Option<CalendarEvent>> {
        self.with_connection(move |conn| {
            let sql = format!("SELECT {EVENT_COLUMNS} FROM calendar_events WHERE id = ?1");
            let event = conn
                .query_row(&sql, [id.to_string()], event_from_row)
                .optional()
                .map_err(InfraError::from)?;
            Ok(event)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn find_event_by_external_id(
        &self,
        connection_id: Uuid,
        external_id: &str,
    ) -> Result<Option<CalendarEvent>> {
        let external_id = external_id.to_string();
        self.with_connection(move |conn| {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM calendar_events
                 WHERE connection_id = ?1 AND external_id = ?2"
            );
            let event = conn
                .query_row(&sql, [connection_id.to_string(), external_id], event_from_row)
                .optional()
                .map_err(InfraError::from)?;
            Ok(event)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_events(
        &self,
        connection_id: Uuid,
        status: Option<SyncStatus>,
    ) -> Result<Vec<CalendarEvent>> {
        self.with_connection(move |conn| {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM calendar_events
                 WHERE connection_id = ?1 AND (?2 IS NULL OR sync_status = ?2)
                 ORDER BY created_at, id"
            );
            let mut stmt = conn.prepare(&sql).map_err(InfraError::from)?;
            let events = stmt
                .query_map(
                    params![connection_id.to_string(), status.map(|s| s.to_string())],
                    event_from_row,
                )
                .map_err(InfraError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(InfraError::from)?;
            Ok(events)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_events_by_circle(&self, circle_id: Uuid) -> Result<Vec<CalendarEvent>> {
        self.with_connection(move |conn| {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM calendar_events
                 WHERE circle_id = ?1
                 ORDER BY created_at, id"
            );
            let mut stmt = conn.prepare(&sql).map_err(InfraError::from)?;
            let events = stmt
                .query_map([circle_id.to_string()], event_from_row)
                .map_err(InfraError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(InfraError::from)?;
            Ok(events)
        })
        .await
    }

    #[instrument(skip(self, event), fields(event_id = %event.id))]
    async fn upsert_event(&self, event: &CalendarEvent) -> Result<()> {
        let event = event.clone();
        self.with_connection(move |conn| write_event(conn, &event)).await
    }

    #[instrument(skip(self, events), fields(count = events.len()))]
    async fn upsert_events(&self, events: &[CalendarEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let events = events.to_vec();
        self.with_connection(move |conn| {
            let tx = conn.transaction().map_err(InfraError::from)?;
            for event in &events {
                write_event(&tx, event)?;
            }
            tx.commit().map_err(InfraError::from)?;

            debug!(count = events.len(), "upserted calendar events");
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_event(&self, id: Uuid) -> Result<bool> {
        self.with_connection(move |conn| {
            let deleted = conn
                .execute("DELETE FROM calendar_events WHERE id = ?1", [id.to_string()])
                .map_err(InfraError::from)?;
            Ok(deleted > 0)
        })
        .await
    }
}

fn write_event(conn: &Connection, event: &CalendarEvent) -> Result<()> {
    let synced_fields = event
        .synced_fields
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| CareSyncError::Internal(format!("failed to encode synced fields: {e}")))?;

    conn.execute(
        &format!(
            "INSERT INTO calendar_events ({EVENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)
             ON CONFLICT(id) DO UPDATE SET
                source_kind = excluded.source_kind,
                source_id = excluded.source_id,
                external_id = excluded.external_id,
                title = excluded.title,
                description = excluded.description,
                start_at = excluded.start_at,
                end_at = excluded.end_at,
                all_day = excluded.all_day,
                location = excluded.location,
                sync_status = excluded.sync_status,
                local_modified_at = excluded.local_modified_at,
                external_modified_at = excluded.external_modified_at,
                last_synced_at = excluded.last_synced_at,
                synced_fields = excluded.synced_fields,
                checksum = excluded.checksum,
                conflict_snapshot = excluded.conflict_snapshot,
                conflict_detected_at = excluded.conflict_detected_at,
                conflict_resolved_at = excluded.conflict_resolved_at,
                resolution = excluded.resolution,
                error_code = excluded.error_code"
        ),
        params![
            event.id.to_string(),
            event.connection_id.to_string(),
            event.circle_id.to_string(),
            event.source.as_ref().map(|s| s.kind.to_string()),
            event.source.as_ref().map(|s| s.id.clone()),
            event.external_id.as_linked(),
            event.fields.title,
            event.fields.description,
            to_micros(event.fields.start),
            to_micros(event.fields.end),
            event.fields.all_day,
            event.fields.location,
            event.sync_status().to_string(),
            to_micros(event.local_modified_at),
            event.external_modified_at.map(to_micros),
            event.last_synced_at.map(to_micros),
            synced_fields,
            event.checksum,
            event.conflict_snapshot(),
            event.conflict_detected_at.map(to_micros),
            event.conflict_resolved_at.map(to_micros),
            event.resolution.map(|r| r.to_string()),
            event.error_code,
            to_micros(event.created_at),
        ],
    )
    .map_err(InfraError::from)?;

    Ok(())
}

// ============================================================================
// Row mapping
// ============================================================================

fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<CalendarConnection> {
    Ok(CalendarConnection {
        id: uuid_column(row, 0)?,
        circle_id: uuid_column(row, 1)?,
        provider: parsed_column(row, 2)?,
        calendar_id: row.get(3)?,
        account: row.get(4)?,
        direction: parsed_column(row, 5)?,
        strategy: parsed_column(row, 6)?,
        last_sync_at: optional_timestamp(row, 7)?,
        last_sync_outcome: optional_parsed_column(row, 8)?,
        status: parsed_column(row, 9)?,
        consecutive_failures: row.get(10)?,
        last_error_code: row.get(11)?,
        created_at: timestamp_column(row, 12)?,
        updated_at: timestamp_column(row, 13)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<CalendarEvent> {
    let fields = EventFields {
        title: row.get(6)?,
        description: row.get(7)?,
        start: timestamp_column(row, 8)?,
        end: timestamp_column(row, 9)?,
        all_day: row.get(10)?,
        location: row.get(11)?,
    };

    let mut event = CalendarEvent::from_storage(
        uuid_column(row, 0)?,
        uuid_column(row, 1)?,
        uuid_column(row, 2)?,
        fields,
        timestamp_column(row, 23)?,
    );

    let source_kind = optional_parsed_column(row, 3)?;
    let source_id: Option<String> = row.get(4)?;
    event.source = source_kind.zip(source_id).map(|(kind, id)| SourceLink { kind, id });
    event.external_id = ExternalId::from(row.get::<_, Option<String>>(5)?);
    event.local_modified_at = timestamp_column(row, 13)?;
    event.external_modified_at = optional_timestamp(row, 14)?;
    event.last_synced_at = optional_timestamp(row, 15)?;
    event.synced_fields = row
        .get::<_, Option<String>>(16)?
        .map(|json| serde_json::from_str::<EventFields>(&json))
        .transpose()
        .map_err(|e| conversion_error(16, Type::Text, e))?;
    event.checksum = row.get(17)?;
    event.conflict_detected_at = optional_timestamp(row, 19)?;
    event.conflict_resolved_at = optional_timestamp(row, 20)?;
    event.resolution = optional_parsed_column(row, 21)?;
    event.error_code = row.get(22)?;

    let status: SyncStatus = parsed_column(row, 12)?;
    let snapshot: Option<String> = row.get(18)?;
    event.with_sync_state(status, snapshot).map_err(|e| conversion_error(12, Type::Text, e))
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn conversion_error<E>(idx: usize, ty: Type, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, ty, err.into())
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, Type::Text, e))
}

fn parsed_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: String| conversion_error(idx, Type::Text, e))
}

fn optional_parsed_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = String>,
{
    row.get::<_, Option<String>>(idx)?
        .map(|raw| raw.parse().map_err(|e: String| conversion_error(idx, Type::Text, e)))
        .transpose()
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| conversion_error(idx, Type::Integer, "timestamp out of range"))
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(micros) => DateTime::from_timestamp_micros(micros)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, Type::Integer, "timestamp out of range")),
        None => Ok(None),
    }
}
