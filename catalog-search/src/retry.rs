//! Per-call timeout and bounded retry for engine calls.

use crate::error::{Result, SearchError};
use catalog_log::warn;
use std::future::Future;
use std::time::Duration;

/// Backoff strategy between retries.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Retry immediately.
    None,
    /// Same delay before every retry.
    Constant(Duration),
    /// Delay grows geometrically per attempt.
    Exponential {
        /// Delay before the first retry.
        initial: Duration,
        /// Upper bound on any single delay.
        max: Duration,
        /// Growth factor per attempt.
        multiplier: f64,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Constant(d) => *d,
            Self::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let factor = multiplier.powi(attempt as i32);
                let millis = (initial.as_millis() as f64 * factor) as u64;
                Duration::from_millis(millis).min(*max)
            }
        }
    }
}

/// Timeout and retry settings applied to every engine call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay between attempts.
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff: BackoffStrategy::default(),
        }
    }
}

impl RetryPolicy {
    /// A single attempt with the given deadline.
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
            backoff: BackoffStrategy::None,
        }
    }

    /// Run `call`, bounding each attempt by the timeout and retrying
    /// `Timeout` and `EngineUnavailable` failures.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(SearchError::Timeout),
            };

            match outcome {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff.delay_for_attempt(attempt);
                    warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        operation,
                        e,
                        attempt + 1,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
