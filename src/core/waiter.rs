//! Bounded polling for resources that change state asynchronously

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::backend::ProviderResult;
use crate::config::WaiterSettings;
use crate::error::{AzError, Result};

/// Polls a probe at a fixed interval, up to `max_attempts` times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl Default for Waiter {
    fn default() -> Self {
        Self::from(&WaiterSettings::default())
    }
}

impl From<&WaiterSettings> for Waiter {
    fn from(settings: &WaiterSettings) -> Self {
        Self {
            delay: Duration::from_secs(settings.delay_secs),
            max_attempts: settings.max_attempts.max(1),
        }
    }
}

impl Waiter {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Poll `probe` until it reports `true`.
    ///
    /// Retryable probe errors count as an unsuccessful attempt; any other
    /// error ends the wait immediately as a mutation failure for `what`.
    ///
    /// # Returns
    ///
    /// The number of attempts used.
    ///
    /// # Errors
    ///
    /// [`AzError::WaitTimeout`] once `max_attempts` probes have not succeeded.
    pub async fn wait_until<F, Fut>(&self, what: &str, mut probe: F) -> Result<u32>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<bool>>,
    {
        for attempt in 1..=self.max_attempts {
            match probe().await {
                Ok(true) => return Ok(attempt),
                Ok(false) => debug!("{} not ready (attempt {}/{})", what, attempt, self.max_attempts),
                Err(e) if e.is_retryable() => {
                    debug!("probe for {} failed transiently: {}", what, e)
                }
                Err(e) => return Err(AzError::mutation(what, e)),
            }

            if attempt < self.max_attempts {
                sleep(self.delay).await;
            }
        }

        Err(AzError::WaitTimeout {
            what: what.to_string(),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ProviderError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_returns_when_ready() {
        let polls = &AtomicU32::new(0);
        let waiter = Waiter::new(Duration::from_millis(1), 10);

        let attempts = waiter
            .wait_until("replication group rg-1", || async move {
                Ok(polls.fetch_add(1, Ordering::SeqCst) >= 2)
            })
            .await
            .unwrap();

        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_times_out() {
        let waiter = Waiter::new(Duration::from_millis(1), 4);
        let err = waiter
            .wait_until("load balancer lb-1", || async { Ok(false) })
            .await
            .unwrap_err();

        match err {
            AzError::WaitTimeout { what, attempts } => {
                assert_eq!(what, "load balancer lb-1");
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_throttled_probe_keeps_polling() {
        let polls = &AtomicU32::new(0);
        let waiter = Waiter::new(Duration::from_millis(1), 5);

        let attempts = waiter
            .wait_until("rg-2", || async move {
                if polls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProviderError::throttled("DescribeReplicationGroups"))
                } else {
                    Ok(true)
                }
            })
            .await
            .unwrap();

        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_hard_probe_error_stops() {
        let waiter = Waiter::new(Duration::from_millis(1), 5);
        let err = waiter
            .wait_until("rg-3", || async { Err(ProviderError::not_found("rg-3")) })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_defaults() {
        let waiter = Waiter::default();
        assert_eq!(waiter.delay, Duration::from_secs(30));
        assert_eq!(waiter.max_attempts, 30);
    }
}
