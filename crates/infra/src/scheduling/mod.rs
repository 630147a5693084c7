//! Periodic sync scheduling
//!
//! The scheduler follows the usual lifecycle rules:
//! - Explicit start/stop
//! - Join handle kept for the spawned task
//! - Cancellation token support, chained to the orchestrator shutdown
//! - Timeout on the final join

pub mod error;
pub mod sync_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use sync_scheduler::SyncScheduler;
