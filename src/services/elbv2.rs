//! Application Load Balancer strategy
//!
//! Matching balancers keep every subnet except those in the target zone. A
//! balancer must stay in at least two zones, so one that would drop below
//! that is skipped rather than changed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::info;

use super::{collect, finish, gone, mutate, would, ActionContext, FailureRun, ServiceKind};
use crate::backend::{LoadBalancerV2, Provider, Tag};
use crate::config::ElbV2Config;
use crate::core::{filter, ExecutionResult, RetryPolicy};
use crate::error::{AzError, Result};
use crate::recovery::{recover_all, RecoveryResult};
use crate::state::{StateEntry, StateRecord};

const SERVICE: ServiceKind = ServiceKind::ElbV2;

/// Zones an application load balancer must keep
pub const MIN_ZONES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElbV2Record {
    pub load_balancer_arn: String,
    pub load_balancer_name: String,
    pub before_subnets: Vec<String>,
    pub after_subnets: Vec<String>,
}

impl StateRecord for ElbV2Record {
    fn resource_id(&self) -> String {
        self.load_balancer_arn.clone()
    }
}

/// Remaining subnets of `lb` once `az` is removed; `Err` is the skip reason
pub fn plan_balancer(lb: &LoadBalancerV2, az: &str) -> std::result::Result<Vec<String>, String> {
    if lb.lb_type != "application" {
        return Err(format!("{} load balancers are not supported", lb.lb_type));
    }
    if lb.state != "active" {
        return Err(format!("load balancer is {}, not active", lb.state));
    }

    let remaining_zones: BTreeSet<&str> = lb
        .zones
        .iter()
        .map(|z| z.zone_name.as_str())
        .filter(|zone| *zone != az)
        .collect();
    if remaining_zones.len() == lb.zones.len() {
        return Err(format!("load balancer has no subnet in {az}"));
    }
    if remaining_zones.len() < MIN_ZONES {
        return Err(format!(
            "removing {az} would leave {} zone(s); at least {MIN_ZONES} are required",
            remaining_zones.len()
        ));
    }

    let mut subnets: Vec<String> = lb
        .zones
        .iter()
        .filter(|z| z.zone_name != az)
        .map(|z| z.subnet_id.clone())
        .collect();
    subnets.sort();
    Ok(subnets)
}

async fn locate(ctx: &ActionContext, tags: &[Tag], az: &str) -> Result<Vec<LoadBalancerV2>> {
    let balancers = ctx
        .query(SERVICE, "DescribeLoadBalancers", || {
            ctx.provider.elbv2.describe_load_balancers(&[])
        })
        .await?;

    let in_zone: Vec<LoadBalancerV2> = balancers
        .into_iter()
        .filter(|lb| lb.zones.iter().any(|z| z.zone_name == az))
        .collect();

    let arns: Vec<String> = in_zone.iter().map(|lb| lb.arn.clone()).collect();
    let mut tag_map: HashMap<String, Vec<Tag>> = HashMap::new();
    for chunk in arns.chunks(filter::TAG_QUERY_CHUNK) {
        let chunk_tags = ctx
            .query(SERVICE, "DescribeTags", || ctx.provider.elbv2.describe_tags(chunk))
            .await?;
        tag_map.extend(chunk_tags);
    }

    Ok(in_zone
        .into_iter()
        .filter(|lb| {
            tag_map
                .get(&lb.arn)
                .is_some_and(|have| filter::tags_match(have, tags))
        })
        .collect())
}

async fn apply(provider: &Provider, retry: &RetryPolicy, dry_run: bool, record: &ElbV2Record) -> Result<()> {
    let arn = record.load_balancer_arn.as_str();
    if dry_run {
        would(
            &record.load_balancer_name,
            format_args!("set subnets to {}", record.after_subnets.join(",")),
        );
        return Ok(());
    }

    mutate(retry, arn, "SetSubnets", || {
        provider.elbv2.set_subnets(arn, &record.after_subnets)
    })
    .await?;
    info!(
        load_balancer = %record.load_balancer_name,
        subnets = %record.after_subnets.join(","),
        "removed target zone subnets"
    );
    Ok(())
}

async fn reverse(provider: &Provider, retry: &RetryPolicy, record: &ElbV2Record) -> Result<()> {
    let arn = record.load_balancer_arn.as_str();
    let arns = [record.load_balancer_arn.clone()];

    let existing = mutate(retry, arn, "DescribeLoadBalancers", || {
        provider.elbv2.describe_load_balancers(&arns)
    })
    .await?;
    if existing.is_empty() {
        return Err(gone(arn, "load balancer"));
    }

    mutate(retry, arn, "SetSubnets", || {
        provider.elbv2.set_subnets(arn, &record.before_subnets)
    })
    .await?;
    info!(load_balancer = %record.load_balancer_name, "restored subnets");
    Ok(())
}

/// Remove the target zone's subnets from matching application load balancers
pub async fn fail_az(ctx: &ActionContext, config: &ElbV2Config) -> Result<FailureRun<ElbV2Record>> {
    if config.tags.is_empty() {
        return Err(AzError::Validation(
            "at least one tag is required to select load balancers".to_string(),
        ));
    }
    ctx.validate_zone(SERVICE, &config.az).await?;
    let store = ctx.store(SERVICE, config.state_path.as_deref())?;
    store.guard_overwrite(config.overwrite_state)?;

    let balancers = locate(ctx, &config.tags, &config.az).await?;
    if balancers.is_empty() {
        return Err(AzError::NoTargets {
            service: SERVICE,
            az: config.az.clone(),
        });
    }

    let mut entry = StateEntry::new(SERVICE, &config.az, config.dry_run);
    let mut items = Vec::new();
    for lb in balancers {
        match plan_balancer(&lb, &config.az) {
            Ok(after_subnets) => {
                let mut before_subnets: Vec<String> =
                    lb.zones.iter().map(|z| z.subnet_id.clone()).collect();
                before_subnets.sort();
                items.push((
                    lb.arn.clone(),
                    ElbV2Record {
                        load_balancer_arn: lb.arn,
                        load_balancer_name: lb.name,
                        before_subnets,
                        after_subnets,
                    },
                ));
            }
            Err(reason) => entry.outcomes.push(ExecutionResult::skipped(&lb.arn, reason)),
        }
    }

    let provider = ctx.provider.clone();
    let retry = ctx.retry.clone();
    let dry_run = config.dry_run;
    let outcomes = ctx
        .executor
        .run(items, move |record: ElbV2Record| {
            let provider = provider.clone();
            let retry = retry.clone();
            async move {
                apply(&provider, &retry, dry_run, &record).await?;
                Ok(record)
            }
        })
        .await;
    collect(&mut entry, outcomes);

    finish(entry, Some(&store))
}

/// Put back the subnet sets recorded by `fail_az`
pub async fn recover_az(ctx: &ActionContext, state_path: Option<&Path>) -> Result<RecoveryResult> {
    let store = ctx.store(SERVICE, state_path)?;
    let provider = ctx.provider.clone();
    let retry = ctx.retry.clone();

    recover_all(store, &ctx.executor, move |record: ElbV2Record| {
        let provider = provider.clone();
        let retry = retry.clone();
        async move { reverse(&provider, &retry, &record).await }
    })
    .await
}
