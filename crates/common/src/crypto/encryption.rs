//! Authenticated symmetric encryption using AES-256-GCM.
//!
//! - [`EncryptionService`]: encrypt/decrypt with a raw 32-byte key
//! - [`EncryptedData`]: serializable container (nonce + ciphertext)
//!
//! Decryption with the wrong key fails with [`CommonError::Crypto`]; the GCM
//! tag guarantees it never yields garbage plaintext.
//!
//! ## Usage
//!
//! ```rust
//! use caresync_common::crypto::encryption::EncryptionService;
//!
//! let key = EncryptionService::generate_key();
//! let service = EncryptionService::new(key)?;
//!
//! let plaintext = b"sensitive data";
//! let encoded = service.encrypt_to_string(plaintext)?;
//! let decrypted = service.decrypt_from_string(&encoded)?;
//! assert_eq!(decrypted, plaintext);
//! # Ok::<(), caresync_common::error::CommonError>(())
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CommonError, CommonResult};

/// Key length in bytes for AES-256.
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;
const ALGORITHM: &str = "AES-256-GCM";

/// Encrypted payload: random nonce plus ciphertext with appended GCM tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub algorithm: String,
}

/// AES-256-GCM encryption service bound to a single key.
pub struct EncryptionService {
    key: Zeroizing<Vec<u8>>,
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService")
            .field("key", &"[REDACTED]")
            .field("algorithm", &ALGORITHM)
            .finish()
    }
}

impl EncryptionService {
    /// Create a new encryption service from a raw 32-byte key.
    pub fn new(key: Vec<u8>) -> CommonResult<Self> {
        let key = Zeroizing::new(key);
        if key.len() != KEY_LEN {
            return Err(CommonError::crypto(
                "init",
                format!("encryption key must be exactly {KEY_LEN} bytes"),
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CommonError::crypto("init", format!("failed to create cipher: {e}")))?;

        Ok(Self { key, cipher })
    }

    /// Create a service from a hex-encoded key, as stored in the keychain.
    pub fn from_hex(hex_key: &str) -> CommonResult<Self> {
        let key = hex::decode(hex_key.trim())
            .map_err(|e| CommonError::crypto("init", format!("key is not valid hex: {e}")))?;
        Self::new(key)
    }

    /// Generate a random 32-byte symmetric key.
    pub fn generate_key() -> Vec<u8> {
        let mut key = vec![0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Encrypt bytes into an `EncryptedData` payload.
    pub fn encrypt(&self, data: &[u8]) -> CommonResult<EncryptedData> {
        let nonce_bytes = Self::generate_nonce();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), data)
            .map_err(|e| CommonError::crypto("encrypt", e.to_string()))?;

        Ok(EncryptedData {
            nonce: nonce_bytes.to_vec(),
            ciphertext,
            algorithm: ALGORITHM.to_string(),
        })
    }

    /// Decrypt an [`EncryptedData`] payload back into raw bytes.
    pub fn decrypt(&self, encrypted: &EncryptedData) -> CommonResult<Vec<u8>> {
        if encrypted.algorithm != ALGORITHM {
            return Err(CommonError::crypto(
                "decrypt",
                format!("unsupported algorithm: {}", encrypted.algorithm),
            ));
        }

        if encrypted.nonce.len() != NONCE_LEN {
            return Err(CommonError::crypto("decrypt", "invalid nonce length"));
        }

        self.cipher
            .decrypt(Nonce::from_slice(&encrypted.nonce), encrypted.ciphertext.as_ref())
            .map_err(|_| CommonError::crypto("decrypt", "authentication failed"))
    }

    /// Encrypt bytes and encode the payload as a base64 string.
    pub fn encrypt_to_string(&self, data: &[u8]) -> CommonResult<String> {
        let encrypted = self.encrypt(data)?;
        let serialized = serde_json::to_vec(&encrypted)?;
        Ok(BASE64.encode(serialized))
    }

    /// Decode a base64 string and decrypt the contained payload.
    pub fn decrypt_from_string(&self, encrypted_str: &str) -> CommonResult<Vec<u8>> {
        let decoded = BASE64
            .decode(encrypted_str)
            .map_err(|e| CommonError::crypto("decrypt", format!("base64 decode failed: {e}")))?;
        let encrypted: EncryptedData = serde_json::from_slice(&decoded)?;
        self.decrypt(&encrypted)
    }

    /// Short fingerprint of the current key, safe to log.
    pub fn key_fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(self.key.as_slice());
        hex::encode(&digest[..8])
    }

    fn generate_nonce() -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }
}
