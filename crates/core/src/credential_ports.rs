//! Secure credential store port.
//!
//! Backed by the platform keychain in production. Entries are device-local
//! and never synced off-device.

use async_trait::async_trait;
use caresync_domain::Result;

/// Named secret material (hex-encoded keys, provider tokens)
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read a secret; `Ok(None)` when no entry exists
    async fn get_secret(&self, name: &str) -> Result<Option<String>>;

    /// Return the hex key stored under `name`, generating `byte_len` random
    /// bytes on first use
    async fn get_or_create_key(&self, name: &str, byte_len: usize) -> Result<String>;

    /// Replace the key under `name` with fresh random bytes and return it
    async fn replace_key(&self, name: &str, byte_len: usize) -> Result<String>;

    /// Remove a secret (idempotent)
    async fn delete_secret(&self, name: &str) -> Result<()>;
}
