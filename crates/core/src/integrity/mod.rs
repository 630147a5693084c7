//! Tamper detection and snapshot encryption for cached sync state.
//!
//! Two independent 32-byte keys live in the [`CredentialStore`]:
//!
//! - the **integrity key** signs event checksums (HMAC-SHA256)
//! - the **encryption key** seals conflict snapshots (AES-256-GCM)
//!
//! Both are created lazily on first use and cached behind one async mutex,
//! so concurrent first use never generates two keys. Rotating the encryption
//! key makes every snapshot sealed under the old key permanently
//! unrecoverable; no copy of the old key is kept.

use std::sync::Arc;

use caresync_common::{CommonError, EncryptionService, MacService};
use caresync_domain::constants::{ENCRYPTION_KEY_ID, INTEGRITY_KEY_ID, SYMMETRIC_KEY_BYTES};
use caresync_domain::{CalendarEvent, CareSyncError, ConflictSnapshot, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::credential_ports::CredentialStore;

/// Result of checking an event against its stored checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityCheck {
    Valid,
    Mismatch,
    /// No checksum has been recorded yet
    Unsealed,
}

#[derive(Default)]
struct KeyCache {
    mac: Option<Arc<MacService>>,
    cipher: Option<Arc<EncryptionService>>,
}

/// Computes and verifies event checksums; encrypts conflict snapshots.
pub struct IntegrityManager {
    credentials: Arc<dyn CredentialStore>,
    keys: Mutex<KeyCache>,
}

impl IntegrityManager {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self { credentials, keys: Mutex::new(KeyCache::default()) }
    }

    /// HMAC over the comparable fields, hex-encoded.
    pub async fn compute_checksum(&self, event: &CalendarEvent) -> Result<String> {
        let mac = self.mac().await?;
        mac.sign(&checksum_input(event)).map_err(security_error)
    }

    /// Constant-time comparison of `expected` with the event's checksum.
    pub async fn verify_checksum(&self, event: &CalendarEvent, expected: &str) -> Result<bool> {
        let mac = self.mac().await?;
        Ok(mac.verify(&checksum_input(event), expected))
    }

    /// Check an event against the checksum it carries.
    pub async fn check_event(&self, event: &CalendarEvent) -> Result<IntegrityCheck> {
        let Some(expected) = event.checksum.as_deref() else {
            return Ok(IntegrityCheck::Unsealed);
        };
        if self.verify_checksum(event, expected).await? {
            Ok(IntegrityCheck::Valid)
        } else {
            Ok(IntegrityCheck::Mismatch)
        }
    }

    /// Recompute and store the event's checksum.
    pub async fn seal(&self, event: &mut CalendarEvent) -> Result<()> {
        event.checksum = Some(self.compute_checksum(event).await?);
        Ok(())
    }

    /// Encrypt arbitrary text into an opaque base64 payload.
    pub async fn encrypt_text(&self, plaintext: &str) -> Result<String> {
        let cipher = self.cipher().await?;
        cipher.encrypt_to_string(plaintext.as_bytes()).map_err(security_error)
    }

    /// Decrypt a payload from [`IntegrityManager::encrypt_text`].
    ///
    /// Fails with [`CareSyncError::Integrity`] when the payload was sealed
    /// under another key or has been altered.
    pub async fn decrypt_text(&self, ciphertext: &str) -> Result<String> {
        let cipher = self.cipher().await?;
        let bytes = cipher
            .decrypt_from_string(ciphertext)
            .map_err(|e| CareSyncError::Integrity(format!("snapshot decrypt failed: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|_| CareSyncError::Integrity("snapshot is not valid UTF-8".to_string()))
    }

    pub async fn encrypt_conflict_snapshot(&self, snapshot: &ConflictSnapshot) -> Result<String> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| CareSyncError::Internal(format!("snapshot serialization failed: {e}")))?;
        self.encrypt_text(&json).await
    }

    pub async fn decrypt_conflict_snapshot(&self, ciphertext: &str) -> Result<ConflictSnapshot> {
        let json = self.decrypt_text(ciphertext).await?;
        serde_json::from_str(&json)
            .map_err(|e| CareSyncError::Integrity(format!("snapshot is malformed: {e}")))
    }

    /// Replace the integrity key. Existing checksums stop verifying until
    /// they are resealed.
    #[instrument(skip(self))]
    pub async fn rotate_integrity_key(&self) -> Result<()> {
        let mut keys = self.keys.lock().await;
        let hex_key = self.credentials.replace_key(INTEGRITY_KEY_ID, SYMMETRIC_KEY_BYTES).await?;
        keys.mac = Some(Arc::new(MacService::from_hex(&hex_key).map_err(security_error)?));
        info!("Integrity key rotated");
        Ok(())
    }

    /// Replace the encryption key. Snapshots sealed under the old key become
    /// permanently unrecoverable.
    #[instrument(skip(self))]
    pub async fn rotate_encryption_key(&self) -> Result<()> {
        let mut keys = self.keys.lock().await;
        let hex_key = self.credentials.replace_key(ENCRYPTION_KEY_ID, SYMMETRIC_KEY_BYTES).await?;
        let cipher = EncryptionService::from_hex(&hex_key).map_err(security_error)?;
        info!(fingerprint = %cipher.key_fingerprint(), "Encryption key rotated");
        keys.cipher = Some(Arc::new(cipher));
        warn!("Conflict snapshots sealed under the previous encryption key are now unrecoverable");
        Ok(())
    }

    async fn mac(&self) -> Result<Arc<MacService>> {
        let mut keys = self.keys.lock().await;
        if let Some(mac) = &keys.mac {
            return Ok(Arc::clone(mac));
        }
        let hex_key =
            self.credentials.get_or_create_key(INTEGRITY_KEY_ID, SYMMETRIC_KEY_BYTES).await?;
        let mac = Arc::new(MacService::from_hex(&hex_key).map_err(security_error)?);
        debug!("Integrity key loaded");
        keys.mac = Some(Arc::clone(&mac));
        Ok(mac)
    }

    async fn cipher(&self) -> Result<Arc<EncryptionService>> {
        let mut keys = self.keys.lock().await;
        if let Some(cipher) = &keys.cipher {
            return Ok(Arc::clone(cipher));
        }
        let hex_key =
            self.credentials.get_or_create_key(ENCRYPTION_KEY_ID, SYMMETRIC_KEY_BYTES).await?;
        let cipher = Arc::new(EncryptionService::from_hex(&hex_key).map_err(security_error)?);
        debug!("Encryption key loaded");
        keys.cipher = Some(Arc::clone(&cipher));
        Ok(cipher)
    }
}

fn security_error(err: CommonError) -> CareSyncError {
    CareSyncError::Security(err.to_string())
}

/// Length-prefixed concatenation in a fixed order, so no two distinct field
/// sets encode to the same bytes. Instants are encoded at the microsecond
/// precision the store keeps.
fn checksum_input(event: &CalendarEvent) -> Vec<u8> {
    fn push(out: &mut Vec<u8>, value: Option<&str>) {
        match value {
            Some(v) => {
                out.extend_from_slice(v.len().to_string().as_bytes());
                out.push(b':');
                out.extend_from_slice(v.as_bytes());
            }
            None => out.push(b'~'),
        }
        out.push(b'|');
    }

    let fields = &event.fields;
    let mut out = Vec::with_capacity(128);
    push(&mut out, Some(&event.id.to_string()));
    push(&mut out, Some(&fields.title));
    push(&mut out, fields.description.as_deref());
    push(&mut out, Some(&fields.start.timestamp_micros().to_string()));
    push(&mut out, Some(&fields.end.timestamp_micros().to_string()));
    push(&mut out, fields.location.as_deref());
    push(&mut out, Some(if fields.all_day { "1" } else { "0" }));
    out
}
