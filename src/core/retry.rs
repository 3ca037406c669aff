//! Retry with backoff for rate-limited provider calls
//!
//! The control plane throttles aggressively during bulk discovery. Every
//! provider call made by a failure strategy goes through [`with_retry`],
//! which re-issues calls that failed with a retryable
//! [`ProviderError`](crate::backend::ProviderError) and gives up after
//! `max_attempts`.
//!
//! # Example
//!
//! ```ignore
//! use az_failure::core::retry::{with_retry, RetryPolicy};
//!
//! let subnets = with_retry(&RetryPolicy::default(), "DescribeSubnets", || async {
//!     ec2.describe_subnets(&filters).await
//! })
//! .await?;
//! ```

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::backend::ProviderResult;
use crate::config::RetrySettings;

/// Backoff strategy for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,

    /// Exponential increase in delay (2^n)
    Exponential,

    /// Exponential with random jitter to prevent thundering herd
    ExponentialWithJitter,
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    pub backoff: BackoffStrategy,

    /// Jitter factor (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff: if settings.jitter {
                BackoffStrategy::ExponentialWithJitter
            } else {
                BackoffStrategy::Exponential
            },
            jitter_factor: 0.3,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Calculate delay before retry number `attempt` (1-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = match self.backoff {
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Exponential | BackoffStrategy::ExponentialWithJitter => {
                let exponent = attempt.saturating_sub(1).min(16);
                self.initial_delay.saturating_mul(2_u32.pow(exponent))
            }
        };

        let capped_delay = base_delay.min(self.max_delay);

        if matches!(self.backoff, BackoffStrategy::ExponentialWithJitter)
            && self.jitter_factor > 0.0
        {
            let jitter = rand::rng().random_range(0.0..self.jitter_factor);
            capped_delay + Duration::from_secs_f64(capped_delay.as_secs_f64() * jitter)
        } else {
            capped_delay
        }
    }
}

/// Execute `operation`, retrying retryable errors with backoff
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded after {} attempts", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.calculate_delay(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    operation_name, attempt, policy.max_attempts, err, delay
                );
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
