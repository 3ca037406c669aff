//! Action façade
//!
//! Maps a service and its target config onto the matching strategy. The
//! registry is the closed [`ServiceKind`] enum; dispatch is an exhaustive
//! match so adding a service without wiring it up does not compile.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::{
    AsgConfig, EksConfig, ElastiCacheConfig, ElbConfig, ElbV2Config, Ec2Config, MqConfig, RdsConfig,
};
use crate::core::{ExecutionResult, RunSummary};
use crate::error::{AzError, Result};
use crate::recovery::RecoveryResult;
use crate::services::{
    asg, ec2, eks, elasticache, elb, elbv2, mq, rds, ActionContext, FailureRun, ServiceKind,
};

/// A `fail_az` invocation for one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "service", rename_all = "lowercase")]
pub enum FailRequest {
    Asg(AsgConfig),
    Ec2(Ec2Config),
    Elb(ElbConfig),
    ElbV2(ElbV2Config),
    Rds(RdsConfig),
    ElastiCache(ElastiCacheConfig),
    Eks(EksConfig),
    Mq(MqConfig),
}

impl FailRequest {
    pub fn service(&self) -> ServiceKind {
        match self {
            FailRequest::Asg(_) => ServiceKind::Asg,
            FailRequest::Ec2(_) => ServiceKind::Ec2,
            FailRequest::Elb(_) => ServiceKind::Elb,
            FailRequest::ElbV2(_) => ServiceKind::ElbV2,
            FailRequest::Rds(_) => ServiceKind::Rds,
            FailRequest::ElastiCache(_) => ServiceKind::ElastiCache,
            FailRequest::Eks(_) => ServiceKind::Eks,
            FailRequest::Mq(_) => ServiceKind::Mq,
        }
    }

    pub fn dry_run(&self) -> bool {
        match self {
            FailRequest::Asg(c) => c.dry_run,
            FailRequest::Ec2(c) => c.dry_run,
            FailRequest::Elb(c) => c.dry_run,
            FailRequest::ElbV2(c) => c.dry_run,
            FailRequest::Rds(c) => c.dry_run,
            FailRequest::ElastiCache(c) => c.dry_run,
            FailRequest::Eks(c) => c.dry_run,
            FailRequest::Mq(c) => c.dry_run,
        }
    }
}

/// A `recover_az` invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverRequest {
    pub service: ServiceKind,
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

/// Service-independent view of a `fail_az` run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
    pub service: ServiceKind,
    pub availability_zone: String,
    pub dry_run: bool,
    pub summary: RunSummary,
    pub outcomes: Vec<ExecutionResult>,
    /// Where the recovery state was written, if it was
    pub state_path: Option<PathBuf>,
    /// The state entry as persisted
    pub entry: serde_json::Value,
}

impl FailureReport {
    fn from_run<R: Serialize>(run: FailureRun<R>) -> Result<Self> {
        let summary = run.summary();
        let entry = serde_json::to_value(&run.entry).map_err(|e| {
            AzError::Validation(format!("state entry could not be serialized: {e}"))
        })?;
        Ok(Self {
            service: run.entry.service,
            availability_zone: run.entry.availability_zone,
            dry_run: run.entry.dry_run,
            summary,
            outcomes: run.entry.outcomes,
            state_path: run.state_path,
            entry,
        })
    }
}

/// Induce an AZ failure for the requested service
pub async fn fail_az(ctx: &ActionContext, request: FailRequest) -> Result<FailureReport> {
    match request {
        FailRequest::Asg(config) => FailureReport::from_run(asg::fail_az(ctx, &config).await?),
        FailRequest::Ec2(config) => FailureReport::from_run(ec2::fail_az(ctx, &config).await?),
        FailRequest::Elb(config) => FailureReport::from_run(elb::fail_az(ctx, &config).await?),
        FailRequest::ElbV2(config) => FailureReport::from_run(elbv2::fail_az(ctx, &config).await?),
        FailRequest::Rds(config) => FailureReport::from_run(rds::fail_az(ctx, &config).await?),
        FailRequest::ElastiCache(config) => {
            FailureReport::from_run(elasticache::fail_az(ctx, &config).await?)
        }
        FailRequest::Eks(config) => FailureReport::from_run(eks::fail_az(ctx, &config).await?),
        FailRequest::Mq(config) => FailureReport::from_run(mq::fail_az(ctx, &config).await?),
    }
}

/// Reverse a previous `fail_az` from its state file
pub async fn recover_az(ctx: &ActionContext, request: RecoverRequest) -> Result<RecoveryResult> {
    let state_path = request.state_path.as_deref();
    match request.service {
        ServiceKind::Asg => asg::recover_az(ctx, state_path).await,
        ServiceKind::Ec2 => ec2::recover_az(ctx, state_path).await,
        ServiceKind::Elb => elb::recover_az(ctx, state_path).await,
        ServiceKind::ElbV2 => elbv2::recover_az(ctx, state_path).await,
        ServiceKind::Eks => eks::recover_az(ctx, state_path).await,
        service @ (ServiceKind::Rds | ServiceKind::ElastiCache | ServiceKind::Mq) => {
            Err(AzError::Validation(format!(
                "{service} failures reverse themselves; there is no recover_az"
            )))
        }
    }
}
