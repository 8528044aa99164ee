//! Bounded retry with exponential backoff and jitter.
//!
//! Every call that crosses a process boundary (database, model API) goes
//! through a [`RetryPolicy`]. The policy decides how often and how long to
//! wait; the call site decides what exhaustion means. Fatal call sites use
//! [`RetryPolicy::run`] and propagate the last error, non-fatal ones use
//! [`RetryPolicy::run_or`] / [`RetryPolicy::run_or_default`] and continue with
//! a fallback value.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::RngExt;

/// Default number of attempts per call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(800);

/// Default upper bound of the uniform jitter.
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(300);

/// Retry settings applied to a single remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. At least one attempt is always made.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }

    /// A policy that never waits between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO).with_max_jitter(Duration::ZERO)
    }

    /// Sets the jitter upper bound.
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Maximum number of attempts, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// `base_delay * 2^(attempt - 1) + uniform(0, max_jitter)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self.base_delay.saturating_mul(1u32 << exponent);

        if self.max_jitter.is_zero() {
            return backoff;
        }

        let mut rng = rand::rng();
        let jitter = rng.random_range(0.0..self.max_jitter.as_secs_f64());
        backoff + Duration::from_secs_f64(jitter)
    }

    /// Runs `f` until it succeeds or the attempts are exhausted.
    ///
    /// Returns the last error after the final attempt. No delay follows the
    /// final attempt.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(operation, |_| true, f).await
    }

    /// Like [`run`](Self::run), but gives up at once on an error that
    /// `retryable` rejects.
    pub async fn run_if<T, E, F, Fut, P>(&self, operation: &str, retryable: P, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && retryable(&err) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Remote call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        operation,
                        attempts = attempt,
                        error = %err,
                        "Remote call failed after final attempt"
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Like [`run`](Self::run), but returns `default` once attempts are exhausted.
    pub async fn run_or<T, E, F, Fut>(&self, operation: &str, default: T, f: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run(operation, f).await.unwrap_or(default)
    }

    /// Like [`run_or`](Self::run_or) with `T::default()` as the fallback.
    pub async fn run_or_default<T, E, F, Fut>(&self, operation: &str, f: F) -> T
    where
        T: Default,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run(operation, f).await.unwrap_or_default()
    }
}
