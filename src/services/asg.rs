//! Auto Scaling group strategy
//!
//! A group spanning several zones loses its subnets in the target zone and
//! has `AZRebalance` suspended so it does not fight the change. A group that
//! only lives in the target zone (or would be left without subnets) is
//! drained instead by zeroing its capacity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{collect, finish, gone, mutate, would, ActionContext, FailureRun, ServiceKind};
use crate::backend::{AutoScalingGroup, Capacity, Filter, Provider, Tag};
use crate::config::AsgConfig;
use crate::core::{filter, ExecutionResult, RetryPolicy, TaskOutcome};
use crate::error::{AzError, Result};
use crate::recovery::{recover_all, RecoveryResult};
use crate::state::{StateEntry, StateRecord};

pub const AZ_REBALANCE: &str = "AZRebalance";

/// The change applied to one group, with what is needed to undo it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum AsgChange {
    SubnetRemoval {
        before_subnets: Vec<String>,
        after_subnets: Vec<String>,
        /// `AZRebalance` was running before the failure
        az_rebalance_was_active: bool,
    },
    ZeroCapacity {
        before: Capacity,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsgRecord {
    pub group_name: String,
    #[serde(flatten)]
    pub change: AsgChange,
}

impl StateRecord for AsgRecord {
    fn resource_id(&self) -> String {
        self.group_name.clone()
    }
}

/// Decide how `group` is failed in `az`.
///
/// `zone_of` maps subnet ids to their zone. Returns the skip reason when the
/// group cannot be failed.
pub fn plan_group(
    group: &AutoScalingGroup,
    zone_of: &HashMap<String, String>,
    az: &str,
) -> std::result::Result<AsgChange, String> {
    let zero = AsgChange::ZeroCapacity {
        before: group.capacity,
    };

    if group.availability_zones.len() <= 1 {
        return Ok(zero);
    }

    if group.subnet_ids.is_empty() {
        return Err(format!(
            "group spans {} zones but has no VPC subnets to remove",
            group.availability_zones.len()
        ));
    }

    let (in_az, remaining): (Vec<String>, Vec<String>) = group
        .subnet_ids
        .iter()
        .cloned()
        .partition(|id| zone_of.get(id).map(String::as_str) == Some(az));

    if in_az.is_empty() {
        return Err(format!("no subnet of the group lies in {az}"));
    }
    if remaining.is_empty() {
        return Ok(zero);
    }

    Ok(AsgChange::SubnetRemoval {
        before_subnets: group.subnet_ids.clone(),
        after_subnets: remaining,
        az_rebalance_was_active: !group
            .suspended_processes
            .iter()
            .any(|p| p == AZ_REBALANCE),
    })
}

/// Groups carrying every tag and listing `az` among their zones
pub(crate) async fn locate(
    ctx: &ActionContext,
    service: ServiceKind,
    names: &[String],
    tags: &[Tag],
    az: &str,
) -> Result<Vec<AutoScalingGroup>> {
    let groups = ctx
        .query(service, "DescribeAutoScalingGroups", || {
            ctx.provider.autoscaling.describe_groups(names)
        })
        .await?;

    Ok(groups
        .into_iter()
        .filter(|g| filter::tags_match(&g.tags, tags))
        .filter(|g| g.availability_zones.iter().any(|z| z == az))
        .collect())
}

/// Resolve the zone of every subnet used by `groups`
pub(crate) async fn subnet_zones(
    ctx: &ActionContext,
    service: ServiceKind,
    groups: &[AutoScalingGroup],
) -> Result<HashMap<String, String>> {
    let mut ids: Vec<String> = groups
        .iter()
        .filter(|g| g.availability_zones.len() > 1)
        .flat_map(|g| g.subnet_ids.iter().cloned())
        .collect();
    ids.sort();
    ids.dedup();

    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let filters = [Filter::new("subnet-id", ids)];
    let subnets = ctx
        .query(service, "DescribeSubnets", || {
            ctx.provider.ec2.describe_subnets(&filters)
        })
        .await?;

    Ok(subnets
        .into_iter()
        .map(|s| (s.subnet_id, s.availability_zone))
        .collect())
}

/// Plan every group, splitting them into records to apply and skips
pub(crate) fn plan_all(
    groups: &[AutoScalingGroup],
    zone_of: &HashMap<String, String>,
    az: &str,
    entry_outcomes: &mut Vec<ExecutionResult>,
) -> Vec<AsgRecord> {
    let mut records = Vec::new();
    for group in groups {
        match plan_group(group, zone_of, az) {
            Ok(change) => records.push(AsgRecord {
                group_name: group.name.clone(),
                change,
            }),
            Err(reason) => {
                debug!(group = %group.name, "skipping: {}", reason);
                entry_outcomes.push(ExecutionResult::skipped(&group.name, reason));
            }
        }
    }
    records
}

/// Apply one planned change
pub(crate) async fn apply(
    provider: &Provider,
    retry: &RetryPolicy,
    dry_run: bool,
    record: &AsgRecord,
) -> Result<()> {
    let name = record.group_name.as_str();
    let asg = &provider.autoscaling;

    match &record.change {
        AsgChange::SubnetRemoval {
            after_subnets,
            az_rebalance_was_active,
            ..
        } => {
            if dry_run {
                if *az_rebalance_was_active {
                    would(name, format_args!("suspend {AZ_REBALANCE}"));
                }
                would(name, format_args!("set subnets to {}", after_subnets.join(",")));
                return Ok(());
            }

            let processes = [AZ_REBALANCE.to_string()];
            if *az_rebalance_was_active {
                mutate(retry, name, "SuspendProcesses", || {
                    asg.suspend_processes(name, &processes)
                })
                .await?;
            }

            let updated = mutate(retry, name, "UpdateAutoScalingGroup", || {
                asg.update_subnets(name, after_subnets)
            })
            .await;

            if let Err(e) = updated {
                if *az_rebalance_was_active {
                    if let Err(undo) = asg.resume_processes(name, &processes).await {
                        warn!(group = %name, "could not resume {} after failed update: {}", AZ_REBALANCE, undo);
                    }
                }
                return Err(e);
            }
            info!(group = %name, subnets = %after_subnets.join(","), "removed target zone subnets");
        }
        AsgChange::ZeroCapacity { before } => {
            if dry_run {
                would(
                    name,
                    format_args!(
                        "set min/max/desired from {}/{}/{} to 0/0/0",
                        before.min_size, before.max_size, before.desired_capacity
                    ),
                );
                return Ok(());
            }
            mutate(retry, name, "UpdateAutoScalingGroup", || {
                asg.update_capacity(name, Capacity::ZERO)
            })
            .await?;
            info!(group = %name, "capacity set to zero");
        }
    }

    Ok(())
}

/// Undo one recorded change; a deleted group is reported as not found
pub(crate) async fn reverse(provider: &Provider, retry: &RetryPolicy, record: &AsgRecord) -> Result<()> {
    let name = record.group_name.as_str();
    let asg = &provider.autoscaling;
    let names = [record.group_name.clone()];

    let existing = mutate(retry, name, "DescribeAutoScalingGroups", || {
        asg.describe_groups(&names)
    })
    .await?;
    if existing.is_empty() {
        return Err(gone(name, "auto scaling group"));
    }

    match &record.change {
        AsgChange::SubnetRemoval {
            before_subnets,
            az_rebalance_was_active,
            ..
        } => {
            mutate(retry, name, "UpdateAutoScalingGroup", || {
                asg.update_subnets(name, before_subnets)
            })
            .await?;
            if *az_rebalance_was_active {
                let processes = [AZ_REBALANCE.to_string()];
                mutate(retry, name, "ResumeProcesses", || {
                    asg.resume_processes(name, &processes)
                })
                .await?;
            }
            info!(group = %name, "restored subnets");
        }
        AsgChange::ZeroCapacity { before } => {
            mutate(retry, name, "UpdateAutoScalingGroup", || {
                asg.update_capacity(name, *before)
            })
            .await?;
            info!(group = %name, "restored capacity");
        }
    }
    Ok(())
}

/// Apply every planned change through the executor
pub(crate) async fn apply_all(
    ctx: &ActionContext,
    records: Vec<AsgRecord>,
    dry_run: bool,
) -> Vec<TaskOutcome<AsgRecord>> {
    let provider = ctx.provider.clone();
    let retry = ctx.retry.clone();
    let items = records
        .into_iter()
        .map(|r| (r.group_name.clone(), r))
        .collect();

    ctx.executor
        .run(items, move |record: AsgRecord| {
            let provider = provider.clone();
            let retry = retry.clone();
            async move {
                apply(&provider, &retry, dry_run, &record).await?;
                Ok(record)
            }
        })
        .await
}

/// Fail `config.az` for every matching Auto Scaling group
pub async fn fail_az(ctx: &ActionContext, config: &AsgConfig) -> Result<FailureRun<AsgRecord>> {
    const SERVICE: ServiceKind = ServiceKind::Asg;

    if config.tags.is_empty() {
        return Err(AzError::Validation(
            "at least one tag is required to select auto scaling groups".to_string(),
        ));
    }
    ctx.validate_zone(SERVICE, &config.az).await?;
    let store = ctx.store(SERVICE, config.state_path.as_deref())?;
    store.guard_overwrite(config.overwrite_state)?;

    let groups = locate(ctx, SERVICE, &[], &config.tags, &config.az).await?;
    if groups.is_empty() {
        return Err(AzError::NoTargets {
            service: SERVICE,
            az: config.az.clone(),
        });
    }
    let zone_of = subnet_zones(ctx, SERVICE, &groups).await?;

    let mut entry = StateEntry::new(SERVICE, &config.az, config.dry_run);
    let records = plan_all(&groups, &zone_of, &config.az, &mut entry.outcomes);

    let outcomes = apply_all(ctx, records, config.dry_run).await;
    collect(&mut entry, outcomes);

    finish(entry, Some(&store))
}

/// Restore every group recorded by a previous `fail_az`
pub async fn recover_az(ctx: &ActionContext, state_path: Option<&Path>) -> Result<RecoveryResult> {
    let store = ctx.store(ServiceKind::Asg, state_path)?;
    let provider = ctx.provider.clone();
    let retry = ctx.retry.clone();

    recover_all(store, &ctx.executor, move |record: AsgRecord| {
        let provider = provider.clone();
        let retry = retry.clone();
        async move { reverse(&provider, &retry, &record).await }
    })
    .await
}
