//! Scheduler error types

use std::time::Duration;

use caresync_domain::CareSyncError;
use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::error::Elapsed;

use crate::errors::InfraError;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler already running")]
    AlreadyRunning,

    #[error("Scheduler not running")]
    NotRunning,

    /// The background task did not finish within the join timeout
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        duration: Duration,
        #[source]
        source: Elapsed,
    },

    #[error("Task join failed: {0}")]
    TaskJoinFailed(#[from] JoinError),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let caresync_err = match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                CareSyncError::InvalidInput(err.to_string())
            }
            _ => CareSyncError::Internal(err.to_string()),
        };
        InfraError(caresync_err)
    }
}

impl From<SchedulerError> for CareSyncError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
