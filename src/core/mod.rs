/*!
 * Core execution machinery shared by every service strategy
 */

pub mod executor;
pub mod filter;
pub mod retry;
pub mod waiter;

pub use executor::{ExecutionResult, ExecutionStatus, Executor, RunSummary, TaskOutcome};
pub use retry::{with_retry, BackoffStrategy, RetryPolicy};
pub use waiter::Waiter;
