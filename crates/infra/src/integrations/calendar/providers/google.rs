//! Google Calendar provider adapter
//!
//! Speaks the Calendar v3 REST API with an access token read from the
//! credential store under the connection's `account` label. Token
//! acquisition and refresh happen outside this crate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use caresync_core::validation::check_range;
use caresync_core::{CredentialStore, ProviderAdapter};
use caresync_domain::{
    CalendarConnection, CalendarEvent, EventFields, ExternalEvent, ProviderError, ProviderKind,
    Result, SyncConfig,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::errors::InfraError;

pub const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: &str = "250";

/// Google Calendar implementation of [`ProviderAdapter`]
pub struct GoogleCalendarAdapter {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
    lookahead_days: i64,
    max_event_span_days: i64,
}

impl GoogleCalendarAdapter {
    pub fn new(credentials: Arc<dyn CredentialStore>, sync: &SyncConfig) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(InfraError::from)?;

        Ok(Self {
            client,
            base_url: GOOGLE_CALENDAR_API_BASE.to_string(),
            credentials,
            lookahead_days: sync.lookahead_days,
            max_event_span_days: sync.max_event_span_days,
        })
    }

    /// Point the adapter at a different API root (test servers, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn access_token(&self, connection: &CalendarConnection) -> std::result::Result<String, ProviderError> {
        match self.credentials.get_secret(&connection.account).await {
            Ok(Some(token)) if !token.is_empty() => Ok(token),
            Ok(_) => Err(ProviderError::NotAuthorized("no access token stored".to_string())),
            Err(e) => {
                warn!(connection_id = %connection.id, error = %e, "credential store unavailable");
                Err(ProviderError::Unavailable("credential store unavailable".to_string()))
            }
        }
    }

    /// `{base}/calendars/{calendar_id}/events[/{event_id}]`, segments encoded.
    fn events_url(
        &self,
        calendar_id: &str,
        event_id: Option<&str>,
    ) -> std::result::Result<Url, ProviderError> {
        let invalid = || ProviderError::Unavailable("invalid provider base url".to_string());

        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| invalid())?;
            segments.pop_if_empty().extend(["calendars", calendar_id, "events"]);
            if let Some(event_id) = event_id {
                segments.push(event_id);
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        request: RequestBuilder,
        token: &str,
        operation: &'static str,
    ) -> std::result::Result<Response, ProviderError> {
        let response = request.bearer_auth(token).send().await.map_err(|e| {
            debug!(operation, error = %e.without_url(), "Google API request failed");
            ProviderError::Unavailable(format!("{operation}: request failed"))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = if status == StatusCode::BAD_REQUEST {
            response.text().await.unwrap_or_default()
        } else {
            String::new()
        };
        Err(status_error(status, operation, &body))
    }
}

#[async_trait]
impl ProviderAdapter for GoogleCalendarAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    #[instrument(skip(self, connection, event), fields(connection_id = %connection.id, event_id = %event.id))]
    async fn create_event(
        &self,
        connection: &CalendarConnection,
        event: &CalendarEvent,
    ) -> std::result::Result<String, ProviderError> {
        let token = self.access_token(connection).await?;
        let url = self.events_url(&connection.calendar_id, None)?;

        let response = self
            .send(self.client.post(url).json(&GoogleEventBody::from(&event.fields)), &token, "create")
            .await?;
        let created: GoogleCalendarEvent = response.json().await.map_err(|_| {
            ProviderError::Unavailable("create: malformed response body".to_string())
        })?;

        debug!(external_id = %created.id, "created Google event");
        Ok(created.id)
    }

    #[instrument(skip(self, connection, event), fields(connection_id = %connection.id, event_id = %event.id))]
    async fn update_event(
        &self,
        connection: &CalendarConnection,
        external_id: &str,
        event: &CalendarEvent,
    ) -> std::result::Result<(), ProviderError> {
        let token = self.access_token(connection).await?;
        let url = self.events_url(&connection.calendar_id, Some(external_id))?;

        self.send(self.client.put(url).json(&GoogleEventBody::from(&event.fields)), &token, "update")
            .await?;
        Ok(())
    }

    #[instrument(skip(self, connection), fields(connection_id = %connection.id))]
    async fn delete_event(
        &self,
        connection: &CalendarConnection,
        external_id: &str,
    ) -> std::result::Result<(), ProviderError> {
        let token = self.access_token(connection).await?;
        let url = self.events_url(&connection.calendar_id, Some(external_id))?;

        match self.send(self.client.delete(url), &token, "delete").await {
            Ok(_) | Err(ProviderError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, connection), fields(connection_id = %connection.id))]
    async fn fetch_changed(
        &self,
        connection: &CalendarConnection,
        since: Option<DateTime<Utc>>,
    ) -> std::result::Result<Vec<ExternalEvent>, ProviderError> {
        let token = self.access_token(connection).await?;
        let url = self.events_url(&connection.calendar_id, None)?;
        let time_max = Utc::now() + chrono::Duration::days(self.lookahead_days);

        let mut base_params: Vec<(&str, String)> = vec![
            ("showDeleted", "true".to_string()),
            ("singleEvents", "true".to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
            ("timeMax", time_max.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ];
        if let Some(since) = since {
            base_params.push(("updatedMin", since.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.client.get(url.clone()).query(&base_params);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let response = self.send(request, &token, "fetch").await?;
            let page: GoogleEventsResponse = response.json().await.map_err(|_| {
                ProviderError::Unavailable("fetch: malformed response body".to_string())
            })?;

            events.extend(page.items.into_iter().filter_map(into_external_event));

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!(count = events.len(), "fetched Google events");
        Ok(events)
    }

    fn to_canonical(
        &self,
        connection: &CalendarConnection,
        external: &ExternalEvent,
    ) -> std::result::Result<CalendarEvent, ProviderError> {
        check_range(&external.fields, self.max_event_span_days)?;
        Ok(CalendarEvent::from_provider(
            connection,
            external.id.clone(),
            external.fields.clone(),
            external.updated_at,
        ))
    }
}

/// Map a failed response. `body` is only consulted for 400s, where Google
/// names an empty or inverted time range with the `timeRangeEmpty` reason.
fn status_error(status: StatusCode, operation: &'static str, body: &str) -> ProviderError {
    let message = format!("{operation}: HTTP {}", status.as_u16());
    match status.as_u16() {
        401 | 403 => ProviderError::NotAuthorized(message),
        404 | 410 => ProviderError::NotFound(message),
        400 if error_reasons(body).iter().any(|r| r == TIME_RANGE_EMPTY) => {
            ProviderError::InvalidDateRange(message)
        }
        400..=499 if !matches!(status.as_u16(), 408 | 429) => ProviderError::Rejected(message),
        _ => ProviderError::Unavailable(message),
    }
}

const TIME_RANGE_EMPTY: &str = "timeRangeEmpty";

fn error_reasons(body: &str) -> Vec<String> {
    serde_json::from_str::<GoogleErrorResponse>(body)
        .map(|r| r.error.errors.into_iter().filter_map(|e| e.reason).collect())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    #[serde(default)]
    errors: Vec<GoogleErrorItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorItem {
    reason: Option<String>,
}

/// Map one listed item; items with unusable timestamps are skipped.
fn into_external_event(item: GoogleCalendarEvent) -> Option<ExternalEvent> {
    let Some(updated_at) = item.updated.as_deref().and_then(parse_rfc3339) else {
        warn!(external_id = %item.id, "Google event without usable updated timestamp skipped");
        return None;
    };
    let cancelled = item.status.as_deref() == Some("cancelled");

    let start = item.start.as_ref().and_then(EventDateTime::to_utc);
    let end = item.end.as_ref().and_then(EventDateTime::to_utc);
    let all_day = item.start.as_ref().is_some_and(|s| s.date.is_some());

    let (start, end) = match (start, end) {
        (Some(start), Some(end)) => (start, end),
        // Cancelled instances often omit times; only the id matters then.
        _ if cancelled => (updated_at, updated_at),
        _ => {
            warn!(external_id = %item.id, "Google event without usable times skipped");
            return None;
        }
    };

    Some(ExternalEvent {
        id: item.id,
        fields: EventFields {
            title: item.summary.unwrap_or_default(),
            description: item.description,
            start,
            end,
            all_day,
            location: item.location,
        },
        updated_at,
        cancelled,
    })
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Deserialize)]
struct GoogleEventsResponse {
    #[serde(default)]
    items: Vec<GoogleCalendarEvent>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarEvent {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start: Option<EventDateTime>,
    end: Option<EventDateTime>,
    updated: Option<String>,
}

#[derive(Debug, Serialize)]
struct GoogleEventBody<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    start: EventDateTime,
    end: EventDateTime,
}

impl<'a> From<&'a EventFields> for GoogleEventBody<'a> {
    fn from(fields: &'a EventFields) -> Self {
        Self {
            summary: &fields.title,
            description: fields.description.as_deref(),
            location: fields.location.as_deref(),
            start: EventDateTime::new(fields.start, fields.all_day),
            end: EventDateTime::new(fields.end, fields.all_day),
        }
    }
}

/// Either a timed instant (`dateTime`) or an all-day date (`date`)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventDateTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
}

impl EventDateTime {
    fn new(at: DateTime<Utc>, all_day: bool) -> Self {
        if all_day {
            Self { date_time: None, date: Some(at.date_naive().format("%Y-%m-%d").to_string()) }
        } else {
            Self { date_time: Some(at.to_rfc3339_opts(SecondsFormat::Millis, true)), date: None }
        }
    }

    /// All-day dates resolve to UTC midnight.
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        if let Some(date_time) = self.date_time.as_deref() {
            return parse_rfc3339(date_time);
        }
        let date = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc())
    }
}
