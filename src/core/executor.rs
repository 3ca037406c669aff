//! Bounded executor for per-resource provider calls.
//!
//! Provider calls are I/O bound, so the executor runs many of them at once
//! on the tokio runtime and caps the number in flight with a semaphore. Each
//! task is isolated: a failure (or panic) in one resource's task is recorded
//! against that resource and never cancels its siblings.
//!
//! Results come back in completion order. Callers correlate them through the
//! resource id carried by every [`TaskOutcome`].

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::error::{AzError, Result};

/// Final status of one resource in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Skipped,
}

/// Per-resource outcome, as reported to callers and stored in state entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub resource_id: String,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn success(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            status: ExecutionStatus::Success,
            error: None,
        }
    }

    pub fn failed(resource_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            status: ExecutionStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn skipped(resource_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            status: ExecutionStatus::Skipped,
            error: Some(reason.into()),
        }
    }

    /// Map an error to `skipped` (precondition, not found) or `failed`
    pub fn from_error(resource_id: impl Into<String>, err: &AzError) -> Self {
        if err.is_skip() {
            Self::skipped(resource_id, err.to_string())
        } else {
            Self::failed(resource_id, err.to_string())
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Aggregated counts over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn from_results(results: &[ExecutionResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result.status {
                ExecutionStatus::Success => summary.succeeded += 1,
                ExecutionStatus::Failed => summary.failed += 1,
                ExecutionStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Success rate as a percentage of attempted (non-skipped) resources
    pub fn success_rate(&self) -> f64 {
        let attempted = self.succeeded + self.failed;
        if attempted == 0 {
            return 100.0;
        }
        (self.succeeded as f64 / attempted as f64) * 100.0
    }
}

/// Outcome of one task, tagged with the resource it belongs to
#[derive(Debug)]
pub struct TaskOutcome<T> {
    pub resource_id: String,
    pub result: Result<T>,
}

impl<T> TaskOutcome<T> {
    pub fn execution_result(&self) -> ExecutionResult {
        match &self.result {
            Ok(_) => ExecutionResult::success(&self.resource_id),
            Err(e) => ExecutionResult::from_error(&self.resource_id, e),
        }
    }
}

/// Runs one async task per resource with bounded concurrency
#[derive(Debug, Clone)]
pub struct Executor {
    concurrency: usize,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CONCURRENCY)
    }
}

impl Executor {
    /// Default cap on in-flight provider calls
    pub const DEFAULT_CONCURRENCY: usize = 10;

    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `task` once for every `(resource_id, item)` pair.
    ///
    /// # Arguments
    ///
    /// * `items` - Work items, each labelled with the resource id it affects
    /// * `task` - Async closure performing the provider calls for one item
    ///
    /// # Returns
    ///
    /// One [`TaskOutcome`] per item, in completion order. A panicking task
    /// yields [`AzError::TaskPanicked`] for its resource.
    pub async fn run<I, T, F, Fut>(&self, items: Vec<(String, I)>, task: F) -> Vec<TaskOutcome<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if items.is_empty() {
            return Vec::new();
        }

        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let task = Arc::new(task);
        let mut join_set = JoinSet::new();

        for (resource_id, item) in items {
            let semaphore = semaphore.clone();
            let task = task.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();

                let result = match AssertUnwindSafe((*task)(item)).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(AzError::TaskPanicked {
                        resource_id: resource_id.clone(),
                        message: panic_message(panic.as_ref()),
                    }),
                };

                match &result {
                    Ok(_) => debug!(resource_id = %resource_id, "task succeeded"),
                    Err(e) if e.is_skip() => debug!(resource_id = %resource_id, "task skipped: {}", e),
                    Err(e) => warn!(resource_id = %resource_id, "task failed: {}", e),
                }

                TaskOutcome {
                    resource_id,
                    result,
                }
            });
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!("executor task did not complete: {}", e),
            }
        }

        outcomes
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ProviderError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn labelled(ids: &[&str]) -> Vec<(String, String)> {
        ids.iter().map(|id| (id.to_string(), id.to_string())).collect()
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let executor = Executor::new(4);
        let outcomes = executor
            .run(labelled(&["a", "b", "c"]), |id: String| async move {
                if id == "b" {
                    Err(AzError::mutation(
                        id,
                        ProviderError::from_code("InvalidParameterValue", "nope"),
                    ))
                } else {
                    Ok(id)
                }
            })
            .await;

        assert_eq!(outcomes.len(), 3);
        let results: Vec<_> = outcomes.iter().map(|o| o.execution_result()).collect();
        let summary = RunSummary::from_results(&results);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);

        let b = results.iter().find(|r| r.resource_id == "b").unwrap();
        assert_eq!(b.status, ExecutionStatus::Failed);
        assert!(b.error.as_deref().unwrap().contains("InvalidParameterValue"));
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_outcome() {
        let executor = Executor::new(2);
        let outcomes = executor
            .run(labelled(&["ok", "boom"]), |id: String| async move {
                if id == "boom" {
                    panic!("provider client exploded");
                }
                Ok(())
            })
            .await;

        let boom = outcomes.iter().find(|o| o.resource_id == "boom").unwrap();
        match &boom.result {
            Err(AzError::TaskPanicked { message, .. }) => {
                assert_eq!(message, "provider client exploded")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        let ok = outcomes.iter().find(|o| o.resource_id == "ok").unwrap();
        assert!(ok.result.is_ok());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let executor = Executor::new(3);

        let ids: Vec<String> = (0..12).map(|i| format!("r{i}")).collect();
        let items = ids.iter().map(|id| (id.clone(), ())).collect();

        let (flight, top) = (in_flight.clone(), peak.clone());
        let outcomes = executor
            .run(items, move |_| {
                let flight = flight.clone();
                let top = top.clone();
                async move {
                    let now = flight.fetch_add(1, Ordering::SeqCst) + 1;
                    top.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert_eq!(outcomes.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_skips_are_not_failures() {
        let executor = Executor::default();
        let outcomes = executor
            .run(labelled(&["lb-1"]), |id: String| async move {
                Err::<(), _>(AzError::precondition(id, "would keep fewer than 2 zones"))
            })
            .await;

        let result = outcomes[0].execution_result();
        assert_eq!(result.status, ExecutionStatus::Skipped);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let outcomes = Executor::new(0)
            .run(Vec::<(String, ())>::new(), |_| async { Ok(()) })
            .await;
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_summary_success_rate() {
        let summary = RunSummary {
            succeeded: 3,
            failed: 1,
            skipped: 5,
        };
        assert_eq!(summary.total(), 9);
        assert!((summary.success_rate() - 75.0).abs() < f64::EPSILON);
        assert!(summary.has_failures());
    }
}
