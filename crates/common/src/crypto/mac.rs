//! Keyed message authentication using HMAC-SHA256.
//!
//! Tags are hex-encoded so they can live in text columns. Verification goes
//! through [`Mac::verify_slice`], which compares in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{CommonError, CommonResult};

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted key length in bytes.
pub const MIN_KEY_LEN: usize = 32;

/// HMAC-SHA256 signer bound to a single key.
pub struct MacService {
    key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for MacService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacService").field("key", &"[REDACTED]").finish()
    }
}

impl MacService {
    pub fn new(key: Vec<u8>) -> CommonResult<Self> {
        let key = Zeroizing::new(key);
        if key.len() < MIN_KEY_LEN {
            return Err(CommonError::crypto(
                "init",
                format!("mac key must be at least {MIN_KEY_LEN} bytes"),
            ));
        }
        Ok(Self { key })
    }

    pub fn from_hex(hex_key: &str) -> CommonResult<Self> {
        let key = hex::decode(hex_key.trim())
            .map_err(|e| CommonError::crypto("init", format!("key is not valid hex: {e}")))?;
        Self::new(key)
    }

    /// Compute the hex-encoded tag for `data`.
    pub fn sign(&self, data: &[u8]) -> CommonResult<String> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Check `expected_hex` against the tag for `data`.
    ///
    /// Malformed hex is a mismatch, not an error.
    pub fn verify(&self, data: &[u8], expected_hex: &str) -> bool {
        let Ok(expected) = hex::decode(expected_hex) else {
            return false;
        };
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(data);
        mac.verify_slice(&expected).is_ok()
    }

    fn mac(&self) -> CommonResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| CommonError::crypto("mac", format!("invalid key: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> MacService {
        MacService::new(vec![0x42; 32]).unwrap()
    }

    #[test]
    fn sign_is_deterministic() {
        let mac = service();
        assert_eq!(mac.sign(b"event").unwrap(), mac.sign(b"event").unwrap());
        assert_eq!(mac.sign(b"event").unwrap().len(), 64);
    }

    #[test]
    fn verify_accepts_own_tag_and_rejects_other_data() {
        let mac = service();
        let tag = mac.sign(b"title=A").unwrap();

        assert!(mac.verify(b"title=A", &tag));
        assert!(!mac.verify(b"title=B", &tag));
    }

    #[test]
    fn verify_rejects_malformed_hex() {
        assert!(!service().verify(b"data", "not-hex"));
        assert!(!service().verify(b"data", ""));
    }

    #[test]
    fn different_keys_produce_different_tags() {
        let other = MacService::new(vec![0x43; 32]).unwrap();
        let tag = service().sign(b"data").unwrap();

        assert!(!other.verify(b"data", &tag));
    }

    #[test]
    fn short_keys_are_rejected() {
        assert!(MacService::new(vec![1; 16]).is_err());
    }
}
