//! Per-service failure strategies
//!
//! Every strategy follows the same shape: validate the target, locate the
//! matching resources (read-only, paginated), plan the transformation for
//! each one, apply it through the [`Executor`], and return a
//! [`StateEntry`] describing exactly what changed. Services with a recovery
//! path persist that entry through a [`StateStore`].

pub mod asg;
pub mod ec2;
pub mod elasticache;
pub mod eks;
pub mod elb;
pub mod elbv2;
pub mod mq;
pub mod rds;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::backend::{Provider, ProviderError, ProviderResult};
use crate::config::{validate_az_format, AppConfig};
use crate::core::{
    with_retry, ExecutionResult, Executor, RetryPolicy, RunSummary, TaskOutcome, Waiter,
};
use crate::error::{AzError, Result};
use crate::state::{StateEntry, StateStore};

/// The fixed catalog of services that support AZ failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Asg,
    Ec2,
    Elb,
    ElbV2,
    Rds,
    ElastiCache,
    Eks,
    Mq,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 8] = [
        ServiceKind::Asg,
        ServiceKind::Ec2,
        ServiceKind::Elb,
        ServiceKind::ElbV2,
        ServiceKind::Rds,
        ServiceKind::ElastiCache,
        ServiceKind::Eks,
        ServiceKind::Mq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Asg => "asg",
            ServiceKind::Ec2 => "ec2",
            ServiceKind::Elb => "elb",
            ServiceKind::ElbV2 => "elbv2",
            ServiceKind::Rds => "rds",
            ServiceKind::ElastiCache => "elasticache",
            ServiceKind::Eks => "eks",
            ServiceKind::Mq => "mq",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ServiceKind::Asg => "EC2 Auto Scaling groups",
            ServiceKind::Ec2 => "EC2 subnets (network ACL blackhole) and instances",
            ServiceKind::Elb => "Classic Load Balancers",
            ServiceKind::ElbV2 => "Application Load Balancers",
            ServiceKind::Rds => "RDS instances and Aurora clusters",
            ServiceKind::ElastiCache => "ElastiCache Redis replication groups",
            ServiceKind::Eks => "EKS managed node groups",
            ServiceKind::Mq => "Amazon MQ ActiveMQ brokers",
        }
    }

    /// Whether `recover_az` exists for this service
    pub fn supports_recovery(&self) -> bool {
        matches!(
            self,
            ServiceKind::Asg
                | ServiceKind::Ec2
                | ServiceKind::Elb
                | ServiceKind::ElbV2
                | ServiceKind::Eks
        )
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = AzError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        ServiceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| AzError::Validation(format!("unknown service '{s}'")))
    }
}

/// Everything a strategy needs besides its own target config
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub provider: Provider,
    pub executor: Executor,
    pub retry: RetryPolicy,
    pub waiter: Waiter,
    pub state_dir: Option<PathBuf>,
}

impl ActionContext {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            executor: Executor::default(),
            retry: RetryPolicy::default(),
            waiter: Waiter::default(),
            state_dir: None,
        }
    }

    pub fn from_config(provider: Provider, config: &AppConfig) -> Self {
        Self {
            provider,
            executor: Executor::new(config.executor.max_concurrent),
            retry: RetryPolicy::from(&config.retry),
            waiter: Waiter::from(&config.waiter),
            state_dir: config.state_dir.clone(),
        }
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_waiter(mut self, waiter: Waiter) -> Self {
        self.waiter = waiter;
        self
    }

    /// State store for `service`, honoring an explicit path override
    pub fn store(&self, service: ServiceKind, explicit: Option<&Path>) -> Result<StateStore> {
        StateStore::resolve(service, explicit, self.state_dir.as_deref())
    }

    /// Run a discovery call with throttling retries
    pub async fn query<T, F, Fut>(&self, service: ServiceKind, operation: &str, call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        with_retry(&self.retry, operation, call)
            .await
            .map_err(|e| AzError::query(service, e))
    }

    /// Check the zone name locally, then against the region's zone list
    pub async fn validate_zone(&self, service: ServiceKind, az: &str) -> Result<()> {
        self.validate_zones(service, &[az.to_string()]).await
    }

    /// Like [`validate_zone`](Self::validate_zone) for several zones; every
    /// name is checked locally before the zone list is fetched
    pub async fn validate_zones(&self, service: ServiceKind, azs: &[String]) -> Result<()> {
        if azs.is_empty() {
            return Err(AzError::Validation(
                "an availability zone is required".to_string(),
            ));
        }
        for az in azs {
            validate_az_format(az)?;
        }

        let zones = self
            .query(service, "DescribeAvailabilityZones", || {
                self.provider.ec2.describe_availability_zones()
            })
            .await?;
        if let Some(az) = azs.iter().find(|az| !zones.contains(az)) {
            return Err(AzError::Validation(format!(
                "availability zone '{az}' is not available in this region"
            )));
        }
        Ok(())
    }
}

/// Result of one `fail_az` invocation
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRun<R> {
    pub entry: StateEntry<R>,
    /// Where the entry was persisted, if it was
    pub state_path: Option<PathBuf>,
}

impl<R> FailureRun<R> {
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.entry.outcomes)
    }
}

/// Run a mutating call for one resource with throttling retries
pub(crate) async fn mutate<T, F, Fut>(
    retry: &RetryPolicy,
    resource_id: &str,
    operation: &str,
    call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    with_retry(retry, operation, call)
        .await
        .map_err(|e| AzError::mutation(resource_id, e))
}

/// Log a mutation that dry-run mode suppressed
pub(crate) fn would(resource_id: &str, action: impl fmt::Display) {
    info!(target: "dry_run", resource_id = %resource_id, "[DRY-RUN] Would {}", action);
}

/// Fold executor outcomes into `entry`: every outcome is reported, only
/// successes become reversal records
pub(crate) fn collect<R>(entry: &mut StateEntry<R>, outcomes: Vec<TaskOutcome<R>>) {
    for outcome in outcomes {
        entry.outcomes.push(outcome.execution_result());
        if let Ok(record) = outcome.result {
            entry.resources.push(record);
        }
    }
}

/// Records and outcomes produced by one stage of a strategy
#[derive(Debug)]
pub(crate) struct Applied<R> {
    pub records: Vec<R>,
    pub outcomes: Vec<ExecutionResult>,
}

impl<R> Default for Applied<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            outcomes: Vec::new(),
        }
    }
}

impl<R> Applied<R> {
    pub fn skip(&mut self, resource_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(resource_id = %resource_id, "skipping: {}", reason);
        self.outcomes.push(ExecutionResult::skipped(resource_id, reason));
    }

    pub fn fail(&mut self, resource_id: &str, error: impl Into<String>) {
        self.outcomes.push(ExecutionResult::failed(resource_id, error));
    }

    pub fn absorb(&mut self, outcomes: Vec<TaskOutcome<R>>) {
        for outcome in outcomes {
            self.outcomes.push(outcome.execution_result());
            if let Ok(record) = outcome.result {
                self.records.push(record);
            }
        }
    }

    /// Move everything into `entry`, converting each record
    pub fn into_entry<T>(self, entry: &mut StateEntry<T>, convert: impl Fn(R) -> T) {
        entry.outcomes.extend(self.outcomes);
        entry.resources.extend(self.records.into_iter().map(convert));
    }
}

/// Not-found error for a recorded resource that no longer exists
pub(crate) fn gone(resource_id: &str, what: &str) -> AzError {
    AzError::mutation(
        resource_id,
        ProviderError::not_found(format!("{what} {resource_id}")),
    )
}

/// Treat a resource that vanished since the failure as already reversed
pub(crate) fn tolerate_missing(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => {
            warn!("{}; treating as reversed", e);
            Ok(())
        }
        other => other,
    }
}

/// Sort, persist (when a store is given and something was applied) and report
pub(crate) fn finish<R: Serialize>(
    mut entry: StateEntry<R>,
    store: Option<&StateStore>,
) -> Result<FailureRun<R>> {
    entry
        .outcomes
        .sort_by(|a, b| a.resource_id.cmp(&b.resource_id));

    let summary = RunSummary::from_results(&entry.outcomes);
    info!(
        service = %entry.service,
        az = %entry.availability_zone,
        dry_run = entry.dry_run,
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        "fail_az finished"
    );

    let state_path = match store {
        Some(store) if !entry.resources.is_empty() => {
            store.save(&entry)?;
            Some(store.path().to_path_buf())
        }
        Some(store) => {
            warn!(
                path = %store.path().display(),
                "no resource was changed; recovery state not written"
            );
            None
        }
        None => None,
    };

    Ok(FailureRun { entry, state_path })
}
