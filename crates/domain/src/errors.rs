//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for CareSync
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CareSyncError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for CareSync operations
pub type Result<T> = std::result::Result<T, CareSyncError>;

/// Closed set of failures a calendar provider can report.
///
/// Messages carry status codes and identifiers only, never event content.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum ProviderError {
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider refused the request for a reason other than the ones
    /// above, e.g. a malformed field. Retrying unchanged input cannot help.
    #[error("Rejected by provider: {0}")]
    Rejected(String),
}

impl ProviderError {
    /// Only transient provider faults are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Stable, content-free code stored on events and connections.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAuthorized(_) => "not_authorized",
            Self::NotFound(_) => "not_found",
            Self::InvalidDateRange(_) => "invalid_date_range",
            Self::Unavailable(_) => "provider_unavailable",
            Self::Rejected(_) => "provider_rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(ProviderError::Unavailable("503".into()).is_retryable());
        assert!(!ProviderError::NotAuthorized("401".into()).is_retryable());
        assert!(!ProviderError::NotFound("404".into()).is_retryable());
        assert!(!ProviderError::InvalidDateRange("end before start".into()).is_retryable());
        assert!(!ProviderError::Rejected("400".into()).is_retryable());
    }

    #[test]
    fn provider_codes_are_stable() {
        assert_eq!(ProviderError::InvalidDateRange(String::new()).code(), "invalid_date_range");
        assert_eq!(ProviderError::Unavailable(String::new()).code(), "provider_unavailable");
        assert_eq!(ProviderError::Rejected(String::new()).code(), "provider_rejected");
    }

    #[test]
    fn errors_serialize_tagged() {
        let json = serde_json::to_value(CareSyncError::Integrity("checksum".into())).unwrap();
        assert_eq!(json["type"], "Integrity");
        assert_eq!(json["message"], "checksum");
    }
}
