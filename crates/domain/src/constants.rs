//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! application.

// Credential store
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "com.caresync.calendar";
pub const INTEGRITY_KEY_ID: &str = "integrity_key";
pub const ENCRYPTION_KEY_ID: &str = "encryption_key";
pub const SYMMETRIC_KEY_BYTES: usize = 32;

// Sanitization limits (characters)
pub const MAX_TITLE_CHARS: usize = 500;
pub const MAX_LOCATION_CHARS: usize = 500;
pub const MAX_DESCRIPTION_CHARS: usize = 8000;

// Sync defaults
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 900;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 4000;
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;
pub const DEFAULT_MAX_EVENT_SPAN_DAYS: i64 = 366;
pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 180;

// Sanitized error codes recorded on events and connections
pub const CODE_INTEGRITY_MISMATCH: &str = "integrity_mismatch";
pub const CODE_RETRIES_EXHAUSTED: &str = "retries_exhausted";
pub const CODE_STORE_FAILURE: &str = "store_failure";
pub const CODE_CANCELLED: &str = "cancelled";
