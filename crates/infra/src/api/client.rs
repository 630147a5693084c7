//! Remote metadata mirror client
//!
//! Keeps a server-side copy of connection records and receives audit events
//! over a small JSON API:
//!
//! - `GET|PUT|DELETE {base}/connections/{id}`
//! - `POST {base}/connections`
//! - `POST {base}/audit`
//!
//! Requests carry a bearer token read from the credential store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use caresync_core::{AuditEvent, AuditSink, CredentialStore, MetadataMirror};
use caresync_domain::{CalendarConnection, CareSyncError, RemoteConfig, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::errors::InfraError;

/// HTTP implementation of [`MetadataMirror`] and [`AuditSink`]
pub struct RemoteMirrorClient {
    client: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialStore>,
    token_key: String,
}

impl RemoteMirrorClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        token_key: impl Into<String>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CareSyncError::Config(format!("invalid remote base url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(CareSyncError::Config("remote base url cannot be a base".into()));
        }
        let client = Client::builder().timeout(timeout).build().map_err(InfraError::from)?;

        Ok(Self { client, base_url, credentials, token_key: token_key.into() })
    }

    /// Build a client when `remote.base_url` is configured.
    pub fn from_config(
        config: &RemoteConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Option<Self>> {
        match config.base_url.as_deref().filter(|url| !url.trim().is_empty()) {
            Some(base_url) => Self::new(
                base_url,
                Duration::from_secs(config.timeout_seconds),
                config.api_token_key.clone(),
                credentials,
            )
            .map(Some),
            None => Ok(None),
        }
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let token = self
            .credentials
            .get_secret(&self.token_key)
            .await?
            .ok_or_else(|| CareSyncError::Auth("remote api token missing".into()))?;

        let response = request.bearer_auth(token).send().await.map_err(InfraError::from)?;
        Ok(response)
    }
}

fn check_status(response: Response) -> Result<Response> {
    response.error_for_status().map_err(|e| InfraError::from(e).into())
}

#[async_trait]
impl MetadataMirror for RemoteMirrorClient {
    #[instrument(skip(self))]
    async fn fetch_connection(&self, id: Uuid) -> Result<Option<CalendarConnection>> {
        let url = self.url(&["connections", &id.to_string()]);
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let connection = check_status(response)?
            .json::<CalendarConnection>()
            .await
            .map_err(InfraError::from)?;
        Ok(Some(connection))
    }

    #[instrument(skip(self, connection), fields(connection_id = %connection.id))]
    async fn insert_connection(&self, connection: &CalendarConnection) -> Result<()> {
        let url = self.url(&["connections"]);
        check_status(self.send(self.client.post(url).json(connection)).await?)?;
        debug!("mirrored new connection");
        Ok(())
    }

    #[instrument(skip(self, connection), fields(connection_id = %connection.id))]
    async fn update_connection(&self, connection: &CalendarConnection) -> Result<()> {
        let url = self.url(&["connections", &connection.id.to_string()]);
        check_status(self.send(self.client.put(url).json(connection)).await?)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_connection(&self, id: Uuid) -> Result<()> {
        let url = self.url(&["connections", &id.to_string()]);
        let response = self.send(self.client.delete(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response)?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for RemoteMirrorClient {
    async fn record(&self, event: AuditEvent) {
        let url = self.url(&["audit"]);
        let outcome = match self.send(self.client.post(url).json(&event)).await {
            Ok(response) => check_status(response).map(|_| ()),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            warn!(audit = event.kind(), error = %e, "audit event not delivered");
        }
    }
}
