//! Bounded retry with backoff for startup connections.
//!
//! Both process roles open their broker connection through
//! [`retry_with_backoff`], parameterized by a [`RetryPolicy`] (attempt limit)
//! and a linear [`Backoff`].
//!
//! # Example
//!
//! ```rust
//! use billing_queue_runtime::retry::{Backoff, RetryPolicy, retry_with_backoff};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(5)
//!     .backoff(Backoff::linear(Duration::from_millis(100)))
//!     .build();
//!
//! let result = retry_with_backoff(&policy, || async {
//!     // Your fallible operation here
//!     Ok::<_, String>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use tokio::time::sleep;

/// Linear delay between failed attempts: `attempt × unit`.
///
/// One unit after the first failure, two after the second, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay added per failed attempt.
    pub unit: Duration,
}

impl Backoff {
    /// Backoff growing by `unit` per failed attempt.
    #[must_use]
    pub const fn linear(unit: Duration) -> Self {
        Self { unit }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        self.unit
            .saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX))
    }
}

/// How many times to attempt an operation, and how long to wait between tries.
///
/// # Default Values
///
/// - `max_attempts`: 10
/// - `backoff`: linear, 1 second per failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: usize,
    /// Delay between attempts.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::connect_default()
    }
}

impl RetryPolicy {
    /// Broker connection policy: 10 attempts, sleeping `attempt × 1s` between them.
    #[must_use]
    pub const fn connect_default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Backoff::linear(Duration::from_secs(1)),
        }
    }

    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_attempts: None,
            backoff: None,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        self.backoff.delay_for_attempt(attempt)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<usize>,
    backoff: Option<Backoff>,
}

impl RetryPolicyBuilder {
    /// Set total number of attempts (at least one is always made).
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set the backoff function.
    #[must_use]
    pub const fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        let defaults = RetryPolicy::connect_default();
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            backoff: self.backoff.unwrap_or(defaults.backoff),
        }
    }
}

/// Retry an async operation until it succeeds or the policy's attempts run out.
///
/// Each failed attempt is logged at `warn` with its attempt number. No sleep
/// follows the final attempt.
///
/// # Returns
///
/// Returns `Ok(T)` from the first successful attempt, or `Err(E)` with the
/// last error once `max_attempts` attempts have failed.
///
/// # Example
///
/// ```rust
/// use billing_queue_runtime::retry::{RetryPolicy, retry_with_backoff};
///
/// # async fn example() -> Result<(), String> {
/// let policy = RetryPolicy::default();
///
/// let result = retry_with_backoff(&policy, || async {
///     Ok::<_, String>(42)
/// }).await?;
///
/// assert_eq!(result, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "Attempt failed"
                );

                if attempt >= max_attempts {
                    tracing::error!(
                        attempts = attempt,
                        error = %err,
                        "Operation failed after max attempts"
                    );
                    return Err(err);
                }

                sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
        }
    }
}
