//! Recovery orchestration
//!
//! Loads a service's state entry, replays the inverse provider calls through
//! the executor and rewrites the state to reflect what is still unresolved:
//!
//! - every record reversed (or found deleted): the state file is removed
//! - some reversals failed: the file is rewritten with only those records,
//!   so running `recover_az` again picks up where this run stopped
//!
//! Services whose reversals depend on each other run several phases over the
//! same [`RecoveryRun`]; each phase sees the records still pending.

use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::core::{ExecutionResult, ExecutionStatus, Executor, RunSummary};
use crate::error::{AzError, Result};
use crate::services::ServiceKind;
use crate::state::{StateEntry, StateRecord, StateStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecoveryStatus {
    /// Every recorded change was reversed; state cleared
    Recovered,
    /// Some reversals failed; state retained for those records
    Partial,
    /// There was nothing to reverse
    NothingToRecover { reason: String },
}

/// Outcome of one `recover_az` invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryResult {
    pub service: ServiceKind,
    pub state_path: PathBuf,
    #[serde(flatten)]
    pub status: RecoveryStatus,
    pub outcomes: Vec<ExecutionResult>,
    /// Records still pending after this run
    pub remaining: usize,
}

impl RecoveryResult {
    fn nothing(store: &StateStore, reason: impl Into<String>) -> Self {
        Self {
            service: store.service(),
            state_path: store.path().to_path_buf(),
            status: RecoveryStatus::NothingToRecover {
                reason: reason.into(),
            },
            outcomes: Vec::new(),
            remaining: 0,
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.outcomes)
    }

    pub fn is_complete(&self) -> bool {
        !matches!(self.status, RecoveryStatus::Partial)
    }
}

/// How a recovery begins: either there is work to do, or a final answer
pub enum RecoveryStart<R> {
    Nothing(RecoveryResult),
    Ready(RecoveryRun<R>),
}

/// In-progress recovery over one state entry
pub struct RecoveryRun<R> {
    store: StateStore,
    entry: StateEntry<R>,
    pending: Vec<R>,
    outcomes: Vec<ExecutionResult>,
}

impl<R: StateRecord> RecoveryRun<R> {
    /// Load the state entry behind `store`.
    ///
    /// A missing file and a dry-run entry both mean there is nothing to
    /// recover. A corrupt file is surfaced as [`AzError::StateCorrupt`].
    pub fn begin(store: StateStore) -> Result<RecoveryStart<R>> {
        let entry: StateEntry<R> = match store.load() {
            Ok(entry) => entry,
            Err(AzError::StateNotFound { .. }) => {
                info!(path = %store.path().display(), "no recovery state; nothing to recover");
                return Ok(RecoveryStart::Nothing(RecoveryResult::nothing(
                    &store,
                    "no recovery state found",
                )));
            }
            Err(e) => return Err(e),
        };

        if entry.dry_run {
            return Ok(RecoveryStart::Nothing(RecoveryResult::nothing(
                &store,
                "state was recorded by a dry run; no changes were made",
            )));
        }

        if entry.resources.is_empty() {
            store.clear()?;
            return Ok(RecoveryStart::Nothing(RecoveryResult::nothing(
                &store,
                "state lists no affected resources",
            )));
        }

        info!(
            service = %store.service(),
            az = %entry.availability_zone,
            resources = entry.resources.len(),
            "starting recovery"
        );

        let pending = entry.resources.clone();
        Ok(RecoveryStart::Ready(RecoveryRun {
            store,
            entry,
            pending,
            outcomes: Vec::new(),
        }))
    }

    pub fn availability_zone(&self) -> &str {
        &self.entry.availability_zone
    }

    /// Reverse every pending record accepted by `select`.
    ///
    /// `select` receives each record along with the full pending set so a
    /// phase can hold back records that other pending records depend on.
    /// Records whose reversal succeeds or which no longer exist are resolved;
    /// failures stay pending.
    pub async fn phase<S, F, Fut>(&mut self, executor: &Executor, select: S, reverse: F)
    where
        S: Fn(&R, &[R]) -> bool,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let chosen: Vec<bool> = self
            .pending
            .iter()
            .map(|record| select(record, &self.pending))
            .collect();

        let mut selected = Vec::new();
        let mut held = Vec::new();
        for (record, take) in std::mem::take(&mut self.pending).into_iter().zip(chosen) {
            if take {
                selected.push(record);
            } else {
                held.push(record);
            }
        }

        let items = selected
            .iter()
            .map(|record| (record.resource_id(), record.clone()))
            .collect();
        let outcomes = executor.run(items, reverse).await;

        let mut unresolved = HashSet::new();
        for outcome in &outcomes {
            let result = outcome.execution_result();
            if result.status == ExecutionStatus::Failed {
                unresolved.insert(result.resource_id.clone());
            }
            self.outcomes.push(result);
        }

        held.extend(
            selected
                .into_iter()
                .filter(|record| unresolved.contains(&record.resource_id())),
        );
        self.pending = held;
    }

    /// Clear or rewrite the state according to what is still pending
    pub fn finish(mut self) -> Result<RecoveryResult> {
        self.outcomes
            .sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        let remaining = self.pending.len();

        let status = if remaining == 0 {
            self.store.clear()?;
            info!(service = %self.store.service(), "recovery complete; state cleared");
            RecoveryStatus::Recovered
        } else {
            warn!(
                service = %self.store.service(),
                remaining,
                "recovery incomplete; state retained for unresolved resources"
            );
            self.entry.resources = self.pending;
            self.entry.outcomes = self.outcomes.clone();
            self.store.save(&self.entry)?;
            RecoveryStatus::Partial
        };

        Ok(RecoveryResult {
            service: self.store.service(),
            state_path: self.store.path().to_path_buf(),
            status,
            outcomes: self.outcomes,
            remaining,
        })
    }
}

/// Single-phase recovery: reverse every record in the entry
pub async fn recover_all<R, F, Fut>(
    store: StateStore,
    executor: &Executor,
    reverse: F,
) -> Result<RecoveryResult>
where
    R: StateRecord,
    F: Fn(R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    match RecoveryRun::<R>::begin(store)? {
        RecoveryStart::Nothing(result) => Ok(result),
        RecoveryStart::Ready(mut run) => {
            run.phase(executor, |_, _| true, reverse).await;
            run.finish()
        }
    }
}
