//! Thin wrapper over the platform keychain for storing secret material.
//!
//! Backed by macOS Keychain Access, Windows Credential Manager or the Linux
//! Secret Service. Entries are device-local; nothing here syncs them
//! anywhere.
//!
//! ## Usage
//!
//! ```no_run
//! use caresync_common::security::keychain::KeychainProvider;
//!
//! let keychain = KeychainProvider::new("com.caresync.calendar");
//! let key = keychain.get_or_create_hex_key("integrity_key", 32)?;
//! assert_eq!(key.len(), 64);
//! # Ok::<(), caresync_common::security::KeychainError>(())
//! ```

use keyring::Entry;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use tracing::debug;

/// Keychain provider scoped to one service name.
pub struct KeychainProvider {
    service_name: String,
}

impl KeychainProvider {
    /// Create a new keychain provider for a specific service
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Store a secret value in the platform keychain
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if keychain access fails
    pub fn set_secret(&self, key: &str, value: &str) -> Result<(), KeychainError> {
        debug!(service = %self.service_name, key = %key, "Storing secret in keychain");

        let entry = self.create_entry(key)?;
        entry.set_password(value).map_err(|e| {
            KeychainError::AccessFailed(format!("Failed to store secret for {}: {}", key, e))
        })?;

        Ok(())
    }

    /// Retrieve a secret value from the platform keychain
    ///
    /// # Errors
    /// Returns `KeychainError::NotFound` if secret doesn't exist
    /// Returns `KeychainError::AccessFailed` if keychain access fails
    pub fn get_secret(&self, key: &str) -> Result<String, KeychainError> {
        debug!(service = %self.service_name, key = %key, "Retrieving secret from keychain");

        let entry = self.create_entry(key)?;
        entry.get_password().map_err(|e| {
            if matches!(e, keyring::Error::NoEntry) {
                KeychainError::NotFound
            } else {
                KeychainError::AccessFailed(format!("Failed to retrieve secret for {}: {}", key, e))
            }
        })
    }

    /// Delete a secret from the platform keychain (idempotent)
    pub fn delete_secret(&self, key: &str) -> Result<(), KeychainError> {
        debug!(service = %self.service_name, key = %key, "Deleting secret from keychain");

        let entry = self.create_entry(key)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KeychainError::AccessFailed(format!(
                "Failed to delete secret for {}: {}",
                key, e
            ))),
        }
    }

    /// Check if a secret exists in the keychain
    #[must_use]
    pub fn secret_exists(&self, key: &str) -> bool {
        self.create_entry(key).map(|entry| entry.get_password().is_ok()).unwrap_or(false)
    }

    /// Return the hex-encoded key stored under `key_id`, generating and
    /// storing `byte_len` random bytes if none exists yet.
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if keychain access fails
    pub fn get_or_create_hex_key(
        &self,
        key_id: &str,
        byte_len: usize,
    ) -> Result<String, KeychainError> {
        match self.get_secret(key_id) {
            Ok(key) => Ok(key),
            Err(KeychainError::NotFound) => {
                debug!(service = %self.service_name, key_id = %key_id, "Generating new key");
                let key = Self::generate_hex_key(byte_len);
                self.set_secret(key_id, &key)?;
                Ok(key)
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the key stored under `key_id` with fresh random bytes.
    pub fn rotate_hex_key(&self, key_id: &str, byte_len: usize) -> Result<String, KeychainError> {
        let key = Self::generate_hex_key(byte_len);
        self.set_secret(key_id, &key)?;
        debug!(service = %self.service_name, key_id = %key_id, "Key rotated");
        Ok(key)
    }

    /// Random bytes, hex-encoded.
    pub fn generate_hex_key(byte_len: usize) -> String {
        let mut bytes = vec![0u8; byte_len];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    fn create_entry(&self, account: &str) -> Result<Entry, KeychainError> {
        Entry::new(&self.service_name, account).map_err(|e| {
            KeychainError::AccessFailed(format!("Failed to create keychain entry: {}", e))
        })
    }
}

/// Keychain error types
#[derive(Debug, Error)]
pub enum KeychainError {
    /// Keychain access failed (permission denied, not available, etc.)
    #[error("Keychain access failed: {0}")]
    AccessFailed(String),

    /// Entry not found in keychain
    #[error("Entry not found")]
    NotFound,
}

impl From<KeychainError> for crate::error::CommonError {
    fn from(err: KeychainError) -> Self {
        match err {
            KeychainError::NotFound => Self::not_found("keychain entry"),
            KeychainError::AccessFailed(message) => Self::storage("keychain", message),
        }
    }
}
