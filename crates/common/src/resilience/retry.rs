//! Retry with backoff and cooperative cancellation.
//!
//! [`RetryExecutor`] runs an async operation up to `max_attempts` times,
//! asking a [`RetryPolicy`] after every failure whether to continue. The
//! cancellation token is checked before each attempt and raced against each
//! backoff sleep, so a cancelled run stops promptly without another attempt.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ErrorClassification;

/// Errors that can occur during retry operations
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All retry attempts have been exhausted
    #[error("All retry attempts exhausted after {attempts} tries")]
    AttemptsExhausted { attempts: u32, last: E },

    /// The operation failed with a non-retryable error
    #[error("Operation failed with non-retryable error")]
    NonRetryable { attempts: u32, source: E },

    /// The cancellation token fired before the operation succeeded
    #[error("Retry cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    /// The retry strategy configuration is invalid
    #[error("Invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Outcome of a retry execution including result and summary statistics.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: RetryResult<T, E>,
    pub attempts: u32,
    /// Every backoff delay that was fully slept, in order.
    pub delays: Vec<Duration>,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> RetryResult<T, E> {
        self.result
    }

    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }
}

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation with the configured backoff delay
    Retry,
    /// Don't retry the operation
    Stop,
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Exponential backoff: initial_delay * base^attempt, capped at max_delay
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// Delay after the failed attempt with the given zero-based index.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let delay = initial_delay.as_millis() as f64 * base.powi(exponent);
                let delay_ms = delay.min(max_delay.as_millis() as f64);
                Duration::from_millis(delay_ms as u64)
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
    /// Sleep the backoff delay after the final failed attempt too, so a
    /// caller that immediately re-runs the operation is still throttled
    pub backoff_after_final_attempt: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_secs(1),
                base: 2.0,
                max_delay: Duration::from_secs(4),
            },
            backoff_after_final_attempt: false,
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RetryError<()>> {
        if self.max_attempts == 0 {
            return Err(RetryError::InvalidConfiguration {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }

        match &self.backoff {
            BackoffStrategy::Exponential { base, .. } if *base <= 0.0 => {
                Err(RetryError::InvalidConfiguration {
                    message: "exponential base must be greater than 0".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base, max_delay };
        self
    }

    pub fn backoff_after_final_attempt(mut self, enabled: bool) -> Self {
        self.config.backoff_after_final_attempt = enabled;
        self
    }

    pub fn build(self) -> Result<RetryConfig, RetryError<()>> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// The main retry executor
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    /// Create a new retry executor with the given configuration and policy
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic and return outcome statistics.
    ///
    /// The operation receives the one-based attempt number.
    pub async fn execute<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempts = 0u32;
        let mut delays = Vec::new();

        loop {
            if cancel.is_cancelled() {
                debug!(attempts, "Retry cancelled before attempt");
                return RetryOutcome { result: Err(RetryError::Cancelled { attempts }), attempts, delays };
            }

            attempts += 1;
            debug!("Executing operation (attempt {}/{})", attempts, self.config.max_attempts);

            let error = match operation(attempts).await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!("Operation succeeded after {} retries", attempts - 1);
                    }
                    return RetryOutcome { result: Ok(value), attempts, delays };
                }
                Err(error) => error,
            };

            if self.policy.should_retry(&error, attempts) == RetryDecision::Stop {
                debug!("Retry policy determined not to retry: {:?}", error);
                return RetryOutcome {
                    result: Err(RetryError::NonRetryable { attempts, source: error }),
                    attempts,
                    delays,
                };
            }

            let final_attempt = attempts >= self.config.max_attempts;
            if final_attempt && !self.config.backoff_after_final_attempt {
                warn!(attempts, "All retry attempts exhausted");
                return RetryOutcome {
                    result: Err(RetryError::AttemptsExhausted { attempts, last: error }),
                    attempts,
                    delays,
                };
            }

            let delay = self.config.backoff.calculate_delay(attempts - 1);
            warn!("Operation failed (attempt {}), backing off for {:?}", attempts, delay);

            if cancel.is_cancelled() {
                return RetryOutcome { result: Err(RetryError::Cancelled { attempts }), attempts, delays };
            }
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(attempts, "Retry cancelled during backoff");
                    return RetryOutcome { result: Err(RetryError::Cancelled { attempts }), attempts, delays };
                }
                () = tokio::time::sleep(delay) => {
                    delays.push(delay);
                }
            }

            if final_attempt {
                warn!(attempts, "All retry attempts exhausted");
                return RetryOutcome {
                    result: Err(RetryError::AttemptsExhausted { attempts, last: error }),
                    attempts,
                    delays,
                };
            }
        }
    }
}

/// Built-in retry policies
pub mod policies {
    use super::*;

    /// Retry every error
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Never retry
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NeverRetry;

    impl<E> RetryPolicy<E> for NeverRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Stop
        }
    }

    /// Retry exactly the errors that classify themselves as retryable
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ClassifiedRetry;

    impl<E: ErrorClassification> RetryPolicy<E> for ClassifiedRetry {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if error.is_retryable() {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for resilience::retry.
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::policies::{AlwaysRetry, NeverRetry};
    use super::*;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig::builder()
            .max_attempts(max_attempts)
            .fixed_backoff(Duration::from_millis(1))
            .build()
            .expect("Should build valid config")
    }

    /// Validates `BackoffStrategy::calculate_delay` behavior for the capped
    /// exponential scenario.
    ///
    /// Assertions:
    /// - Confirms delays double from 1s and stop at the 4s cap.
    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = BackoffStrategy::Exponential {
            initial_delay: Duration::from_secs(1),
            base: 2.0,
            max_delay: Duration::from_secs(4),
        };

        assert_eq!(backoff.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(backoff.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(backoff.calculate_delay(2), Duration::from_secs(4));
        assert_eq!(backoff.calculate_delay(5), Duration::from_secs(4));
    }

    /// Validates `RetryConfig::validate` behavior for the zero attempts
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures the builder rejects `max_attempts(0)`.
    #[test]
    fn test_zero_attempts_is_invalid() {
        let result = RetryConfig::builder().max_attempts(0).build();
        assert!(matches!(result, Err(RetryError::InvalidConfiguration { .. })));
    }

    /// Tests retry executor succeeds after temporary failures
    #[tokio::test]
    async fn test_retry_executor_with_always_retry_success() {
        let executor = RetryExecutor::new(fast_config(3), AlwaysRetry);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let outcome = executor
            .execute(&CancellationToken::new(), |_| {
                let c = Arc::clone(&counter_clone);
                async move {
                    let count = c.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err("temporary failure")
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.into_result().expect("eventually succeeds"), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    /// Tests NeverRetry policy stops after the first failure.
    #[tokio::test]
    async fn test_retry_executor_with_never_retry() {
        let executor = RetryExecutor::new(fast_config(3), NeverRetry);

        let outcome = executor
            .execute(&CancellationToken::new(), |_| async { Err::<(), _>("fatal") })
            .await;

        assert_eq!(outcome.attempts, 1);
        assert!(matches!(outcome.result, Err(RetryError::NonRetryable { source: "fatal", .. })));
    }

    /// Tests that an already-cancelled token prevents any attempt.
    #[tokio::test]
    async fn test_cancelled_token_skips_attempts() {
        let executor = RetryExecutor::new(fast_config(3), AlwaysRetry);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = executor.execute(&token, |_| async { Ok::<_, &str>(1) }).await;

        assert_eq!(outcome.attempts, 0);
        assert!(matches!(outcome.result, Err(RetryError::Cancelled { attempts: 0 })));
    }
}
