//! Retry with exponential backoff
//!
//! [`Retrier`] wraps a fallible async operation, classifies each failure as
//! retryable or permanent and sleeps between attempts. Both the sleep and the
//! in-flight attempt race against the run's [`CancelToken`].

use crate::cancel::CancelToken;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Classifies an error for the retry loop
pub trait Retryable {
    /// Returns true if the operation may succeed when tried again
    fn is_retryable(&self) -> bool;

    /// Server-requested delay before the next attempt, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Terminal outcome of a retried operation
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Permanent failure: {0}")]
    Permanent(E),

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    /// Returns the underlying operation error, if there is one
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Cancelled => None,
            Self::Permanent(e) | Self::Exhausted { last: e, .. } => Some(e),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Backoff configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Relative jitter; 0.5 randomizes each delay within ±50%
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.5,
        }
    }
}

impl RetryConfig {
    /// Deterministic delay before retry number `retry` (0-based), capped
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use sumi_harvest::crawler::RetryConfig;
    ///
    /// let config = RetryConfig::default();
    /// assert_eq!(config.backoff(0), Duration::from_secs(1));
    /// assert_eq!(config.backoff(2), Duration::from_secs(4));
    /// assert_eq!(config.backoff(10), Duration::from_secs(30));
    /// ```
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }

    /// Applies random jitter to a delay, keeping it under `max_delay`
    pub fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay.min(self.max_delay);
        }

        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        delay.mul_f64(factor.max(0.0)).min(self.max_delay)
    }
}

/// Executes operations with classified retry and exponential backoff
#[derive(Debug, Clone, Default)]
pub struct Retrier {
    config: RetryConfig,
}

impl Retrier {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `op` until it succeeds, fails permanently, runs out of attempts or
    /// `cancel` fires
    ///
    /// The error type decides retryability through [`Retryable`], which also
    /// lets it request a specific delay (`Retry-After`).
    pub async fn retry<T, E, F, Fut>(&self, cancel: &CancelToken, op: F) -> Result<T, RetryError<E>>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(cancel, E::is_retryable, E::retry_after, op).await
    }

    /// Like [`Retrier::retry`] with an injected classifier
    pub async fn retry_with<T, E, C, F, Fut>(
        &self,
        cancel: &CancelToken,
        is_retryable: C,
        op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Display,
        C: Fn(&E) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(cancel, is_retryable, |_: &E| None, op).await
    }

    async fn run<T, E, C, R, F, Fut>(
        &self,
        cancel: &CancelToken,
        is_retryable: C,
        retry_after: R,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Display,
        C: Fn(&E) -> bool,
        R: Fn(&E) -> Option<Duration>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                result = op() => result,
            };

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Succeeded on attempt {}/{}", attempt, max_attempts);
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !is_retryable(&err) {
                return Err(RetryError::Permanent(err));
            }

            if attempt >= max_attempts {
                warn!("Giving up after {} attempts: {}", attempt, err);
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = match retry_after(&err) {
                Some(requested) => requested.min(self.config.max_delay),
                None => self
                    .config
                    .jittered(self.config.backoff(attempt - 1)),
            };

            warn!(
                "Attempt {}/{} failed: {}. Retrying in {:?}",
                attempt, max_attempts, err, delay
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
