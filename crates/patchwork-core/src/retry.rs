//! Injectable retry policy
//!
//! The read-after-write verification in the node creation saga retries a
//! failed read. The default policy is two attempts with a fixed 50ms pause
//! between them; tests use [`RetryPolicy::immediate`] to stay deterministic.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Retry immediately
    None,
    /// Same pause before every retry
    Fixed {
        /// Pause in milliseconds
        delay_ms: u64,
    },
    /// `initial_ms * factor^(retry-1)`, capped at `max_ms`
    Exponential {
        /// First pause in milliseconds
        initial_ms: u64,
        /// Growth factor per retry
        factor: f64,
        /// Upper bound in milliseconds
        max_ms: u64,
    },
}

impl Backoff {
    /// Pause before retry number `retry` (1-based)
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Self::Exponential {
                initial_ms,
                factor,
                max_ms,
            } => {
                let exp = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
                let scaled = (initial_ms as f64) * factor.powi(exp);
                let capped = if scaled.is_finite() {
                    scaled.min(max_ms as f64)
                } else {
                    max_ms as f64
                };
                Duration::from_millis(capped.max(0.0) as u64)
            }
        }
    }
}

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay schedule
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Initial read plus one retry after 50ms
    #[inline]
    #[must_use]
    pub fn verification_default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Backoff::Fixed { delay_ms: 50 },
        }
    }

    /// `max_attempts` attempts with no delay
    #[inline]
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::None,
        }
    }

    /// With backoff
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run `op` until it succeeds or attempts are exhausted
    ///
    /// `op` receives the 1-based attempt number.
    ///
    /// # Errors
    /// Returns the last error together with the number of attempts made.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(last) if attempt >= attempts => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last,
                    })
                }
                Err(err) => {
                    let pause = self.backoff.delay(attempt);
                    tracing::debug!(attempt, ?pause, error = %err, "attempt failed, retrying");
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::verification_default()
    }
}

/// Final failure of a retried call
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted<E> {
    /// Attempts made
    pub attempts: u32,
    /// Error from the last attempt
    pub last: E,
}
