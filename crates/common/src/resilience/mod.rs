//! Resilience patterns for transient failures.
//!
//! Currently a single pattern: retry with backoff that honours a
//! `CancellationToken`.

pub mod retry;

pub use retry::{
    policies, BackoffStrategy, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryOutcome, RetryPolicy, RetryResult,
};
