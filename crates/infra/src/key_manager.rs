//! Credential store backed by the system keyring
use std::sync::Arc;

use async_trait::async_trait;
use caresync_common::{KeychainError, KeychainProvider};
use caresync_core::CredentialStore;
use caresync_domain::{CareSyncError, KeychainConfig, Result};
use tracing::instrument;

use crate::errors::InfraError;

/// [`CredentialStore`] over the platform keychain.
///
/// Keychain calls block, so each one runs on the blocking pool.
#[derive(Clone)]
pub struct KeychainCredentialStore {
    keychain: Arc<KeychainProvider>,
}

impl KeychainCredentialStore {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { keychain: Arc::new(KeychainProvider::new(service_name)) }
    }

    pub fn from_config(config: &KeychainConfig) -> Self {
        Self::new(config.service_name.clone())
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&KeychainProvider) -> std::result::Result<T, KeychainError> + Send + 'static,
    {
        let keychain = Arc::clone(&self.keychain);
        tokio::task::spawn_blocking(move || op(&keychain))
            .await
            .map_err(|e| CareSyncError::Internal(format!("keychain task failed: {e}")))?
            .map_err(|e| InfraError::from(e).into())
    }
}

#[async_trait]
impl CredentialStore for KeychainCredentialStore {
    #[instrument(skip(self))]
    async fn get_secret(&self, name: &str) -> Result<Option<String>> {
        let name = name.to_string();
        self.run(move |keychain| match keychain.get_secret(&name) {
            Ok(secret) => Ok(Some(secret)),
            Err(KeychainError::NotFound) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_or_create_key(&self, name: &str, byte_len: usize) -> Result<String> {
        let name = name.to_string();
        self.run(move |keychain| keychain.get_or_create_hex_key(&name, byte_len)).await
    }

    #[instrument(skip(self))]
    async fn replace_key(&self, name: &str, byte_len: usize) -> Result<String> {
        let name = name.to_string();
        self.run(move |keychain| keychain.rotate_hex_key(&name, byte_len)).await
    }

    #[instrument(skip(self))]
    async fn delete_secret(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.run(move |keychain| keychain.delete_secret(&name)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_secret_reads_as_none() {
        let store = KeychainCredentialStore::new("com.caresync.test.missing");

        let secret = store.get_secret("never-written").await.expect("lookup succeeds");
        assert_eq!(secret, None);
    }

    #[tokio::test]
    async fn deleting_missing_secret_is_idempotent() {
        let store = KeychainCredentialStore::new("com.caresync.test.delete");

        store.delete_secret("never-written").await.expect("first delete");
        store.delete_secret("never-written").await.expect("second delete");
    }
}
