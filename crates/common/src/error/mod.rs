//! Errors raised by the generic building blocks in this crate, plus the
//! classification interface the retry executor and the sync engine share.
//!
//! Crate-specific errors wrap [`CommonError`] instead of repeating its
//! variants:
//!
//! ```rust,ignore
//! #[derive(Debug, Error)]
//! pub enum StoreError {
//!     #[error("row is corrupt: {0}")]
//!     Corrupt(String),
//!
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type CommonResult<T> = Result<T, CommonError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommonError {
    /// Encoding or decoding of an envelope failed
    #[error("{format} serialization failed: {message}")]
    Serialization { format: &'static str, message: String },

    /// Key material, encryption, decryption or MAC failure
    #[error("crypto operation '{operation}' failed: {message}")]
    Crypto { operation: String, message: String },

    /// A remote dependency failed
    #[error("backend '{service}' failed: {message}")]
    Backend { service: String, message: String, retryable: bool },

    #[error("not authorized to perform '{operation}'")]
    Unauthorized { operation: String },

    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Local secret or file storage failed
    #[error("storage operation '{operation}' failed: {message}")]
    Storage { operation: String, message: String },
}

impl CommonError {
    pub fn crypto(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Crypto { operation: operation.into(), message: message.into() }
    }

    pub fn backend(service: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Backend { service: service.into(), message: message.into(), retryable }
    }

    pub fn unauthorized(operation: impl Into<String>) -> Self {
        Self::Unauthorized { operation: operation.into() }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage { operation: operation.into(), message: message.into() }
    }
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend { retryable: true, .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotFound { .. } => ErrorSeverity::Info,
            Self::Unauthorized { .. } => ErrorSeverity::Warning,
            Self::Backend { retryable: true, .. } => ErrorSeverity::Warning,
            Self::Serialization { .. } | Self::Backend { .. } | Self::Storage { .. } => {
                ErrorSeverity::Error
            }
            // Key or ciphertext corruption
            Self::Crypto { .. } => ErrorSeverity::Critical,
        }
    }
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization { format: "JSON", message: err.to_string() }
    }
}

/// Lets retry loops and log sites ask an error how to treat it without
/// knowing its concrete type.
pub trait ErrorClassification {
    fn is_retryable(&self) -> bool;

    fn severity(&self) -> ErrorSeverity;

    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Server-suggested delay before the next attempt, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_retryability_follows_flag() {
        let transient = CommonError::backend("calendar", "503", true);
        let permanent = CommonError::backend("calendar", "400", false);

        assert!(transient.is_retryable());
        assert_eq!(transient.severity(), ErrorSeverity::Warning);
        assert!(!permanent.is_retryable());
        assert_eq!(permanent.severity(), ErrorSeverity::Error);
    }

    #[test]
    fn crypto_errors_are_critical_and_final() {
        let err = CommonError::crypto("decrypt", "tag mismatch");
        assert!(!err.is_retryable());
        assert!(err.is_critical());
        assert_eq!(err.to_string(), "crypto operation 'decrypt' failed: tag mismatch");
    }

    #[test]
    fn json_errors_convert_to_serialization() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: CommonError = parse.unwrap_err().into();
        assert!(matches!(err, CommonError::Serialization { format: "JSON", .. }));
    }

    #[test]
    fn severities_order_by_urgency() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
    }
}
