//! Pass-level sync errors

use std::time::Duration;

use caresync_common::{ErrorClassification, ErrorSeverity};
use caresync_domain::constants::{CODE_CANCELLED, CODE_INTEGRITY_MISMATCH, CODE_RETRIES_EXHAUSTED, CODE_STORE_FAILURE};
use caresync_domain::{CareSyncError, ProviderError};
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the orchestrator's entry points.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(CareSyncError),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("sync pass cancelled")]
    Cancelled,

    #[error("connection {0} not found")]
    ConnectionNotFound(Uuid),

    #[error("connection {0} is disabled")]
    ConnectionDisabled(Uuid),

    #[error("a sync pass for connection {0} is already running")]
    PassInProgress(Uuid),

    #[error("event {0} not found")]
    EventNotFound(Uuid),

    #[error("sync failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<SyncError> },

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl SyncError {
    /// Stable, content-free code recorded on connections and in audits.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Provider(err) => err.code(),
            Self::Store(_) => CODE_STORE_FAILURE,
            Self::Integrity(_) => CODE_INTEGRITY_MISMATCH,
            Self::Cancelled => CODE_CANCELLED,
            Self::ConnectionNotFound(_) | Self::EventNotFound(_) => "not_found",
            Self::ConnectionDisabled(_) => "connection_disabled",
            Self::PassInProgress(_) => "pass_in_progress",
            Self::RetriesExhausted { last, .. } => match last.as_ref() {
                Self::Provider(err) => err.code(),
                _ => CODE_RETRIES_EXHAUSTED,
            },
            Self::InvalidState(_) => "invalid_state",
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Provider(ProviderError::NotAuthorized(_)))
    }
}

impl From<CareSyncError> for SyncError {
    fn from(err: CareSyncError) -> Self {
        match err {
            CareSyncError::Integrity(msg) | CareSyncError::Security(msg) => Self::Integrity(msg),
            CareSyncError::InvalidInput(msg) => Self::InvalidState(msg),
            other => Self::Store(other),
        }
    }
}

impl ErrorClassification for SyncError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(err) => err.is_retryable(),
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Cancelled | Self::PassInProgress(_) => ErrorSeverity::Info,
            Self::Provider(ProviderError::NotAuthorized(_))
            | Self::Provider(ProviderError::Unavailable(_))
            | Self::ConnectionDisabled(_) => ErrorSeverity::Warning,
            Self::Store(_) | Self::Integrity(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_provider_errors_retry() {
        assert!(SyncError::Provider(ProviderError::Unavailable("503".into())).is_retryable());
        assert!(!SyncError::Provider(ProviderError::NotAuthorized("401".into())).is_retryable());
        assert!(!SyncError::Store(CareSyncError::Database("locked".into())).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn exhausted_reports_underlying_provider_code() {
        let err = SyncError::RetriesExhausted {
            attempts: 3,
            last: Box::new(SyncError::Provider(ProviderError::Unavailable("timeout".into()))),
        };
        assert_eq!(err.code(), "provider_unavailable");
    }

    #[test]
    fn security_failures_map_to_integrity() {
        let err: SyncError = CareSyncError::Security("bad key".into()).into();
        assert_eq!(err, SyncError::Integrity("bad key".into()));
        assert_eq!(err.code(), CODE_INTEGRITY_MISMATCH);
    }
}
