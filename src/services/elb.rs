//! Classic Load Balancer strategy
//!
//! Balancers in a custom VPC have their subnets in the target zone
//! detached. Balancers in the default VPC (or EC2-Classic) have the zone
//! itself disabled.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

use super::{collect, finish, gone, mutate, would, ActionContext, FailureRun, ServiceKind};
use crate::backend::{ClassicLoadBalancer, Filter, Provider, Tag};
use crate::config::ElbConfig;
use crate::core::{filter, ExecutionResult, RetryPolicy};
use crate::error::{AzError, Result};
use crate::recovery::{recover_all, RecoveryResult};
use crate::state::{StateEntry, StateRecord};

const SERVICE: ServiceKind = ServiceKind::Elb;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ElbChange {
    /// Subnets detached from a VPC balancer
    Subnets {
        before: Vec<String>,
        removed: Vec<String>,
    },
    /// Zones disabled on a default-VPC balancer
    Zones {
        before: Vec<String>,
        removed: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElbRecord {
    pub load_balancer_name: String,
    #[serde(flatten)]
    pub change: ElbChange,
}

impl StateRecord for ElbRecord {
    fn resource_id(&self) -> String {
        self.load_balancer_name.clone()
    }
}

/// Decide how `lb` loses `az`; `Err` carries the skip reason.
///
/// `default_vpc` is the region's default VPC and `zone_of` maps the
/// balancer's subnets to zones.
pub fn plan_balancer(
    lb: &ClassicLoadBalancer,
    default_vpc: Option<&str>,
    zone_of: &HashMap<String, String>,
    az: &str,
) -> std::result::Result<ElbChange, String> {
    let in_default_vpc = match lb.vpc_id.as_deref() {
        None => true,
        Some(vpc) => Some(vpc) == default_vpc,
    };

    if in_default_vpc {
        if lb.availability_zones.len() <= 1 {
            return Err(format!("{az} is the only zone of the balancer"));
        }
        return Ok(ElbChange::Zones {
            before: lb.availability_zones.clone(),
            removed: vec![az.to_string()],
        });
    }

    let removed: Vec<String> = lb
        .subnet_ids
        .iter()
        .filter(|id| zone_of.get(*id).map(String::as_str) == Some(az))
        .cloned()
        .collect();

    if removed.is_empty() {
        return Err(format!("no subnet of the balancer lies in {az}"));
    }
    if removed.len() == lb.subnet_ids.len() {
        return Err("detaching would leave the balancer without subnets".to_string());
    }

    Ok(ElbChange::Subnets {
        before: lb.subnet_ids.clone(),
        removed,
    })
}

/// Balancers listing `az`, restricted to `names`, carrying every tag
async fn locate(
    ctx: &ActionContext,
    names: &[String],
    tags: &[Tag],
    az: &str,
) -> Result<Vec<ClassicLoadBalancer>> {
    let balancers = ctx
        .query(SERVICE, "DescribeLoadBalancers", || {
            ctx.provider.elb.describe_load_balancers(names)
        })
        .await?;

    let in_zone: Vec<ClassicLoadBalancer> = balancers
        .into_iter()
        .filter(|lb| lb.availability_zones.iter().any(|z| z == az))
        .collect();

    let lb_names: Vec<String> = in_zone.iter().map(|lb| lb.name.clone()).collect();
    let mut tag_map: HashMap<String, Vec<Tag>> = HashMap::new();
    for chunk in lb_names.chunks(filter::TAG_QUERY_CHUNK) {
        let chunk_tags = ctx
            .query(SERVICE, "DescribeTags", || ctx.provider.elb.describe_tags(chunk))
            .await?;
        tag_map.extend(chunk_tags);
    }

    Ok(in_zone
        .into_iter()
        .filter(|lb| {
            tag_map
                .get(&lb.name)
                .is_some_and(|have| filter::tags_match(have, tags))
        })
        .collect())
}

async fn apply(provider: &Provider, retry: &RetryPolicy, dry_run: bool, record: &ElbRecord) -> Result<()> {
    let name = record.load_balancer_name.as_str();
    let elb = &provider.elb;

    match &record.change {
        ElbChange::Subnets { removed, .. } => {
            if dry_run {
                would(name, format_args!("detach subnets {}", removed.join(",")));
                return Ok(());
            }
            mutate(retry, name, "DetachLoadBalancerFromSubnets", || {
                elb.detach_subnets(name, removed)
            })
            .await?;
            info!(load_balancer = %name, subnets = %removed.join(","), "detached subnets");
        }
        ElbChange::Zones { removed, .. } => {
            if dry_run {
                would(name, format_args!("disable zones {}", removed.join(",")));
                return Ok(());
            }
            mutate(retry, name, "DisableAvailabilityZonesForLoadBalancer", || {
                elb.disable_availability_zones(name, removed)
            })
            .await?;
            info!(load_balancer = %name, zones = %removed.join(","), "disabled zones");
        }
    }
    Ok(())
}

async fn reverse(provider: &Provider, retry: &RetryPolicy, record: &ElbRecord) -> Result<()> {
    let name = record.load_balancer_name.as_str();
    let elb = &provider.elb;
    let names = [record.load_balancer_name.clone()];

    let existing = mutate(retry, name, "DescribeLoadBalancers", || {
        elb.describe_load_balancers(&names)
    })
    .await?;
    if existing.is_empty() {
        return Err(gone(name, "load balancer"));
    }

    match &record.change {
        ElbChange::Subnets { removed, .. } => {
            mutate(retry, name, "AttachLoadBalancerToSubnets", || {
                elb.attach_subnets(name, removed)
            })
            .await?;
            info!(load_balancer = %name, "re-attached subnets");
        }
        ElbChange::Zones { removed, .. } => {
            mutate(retry, name, "EnableAvailabilityZonesForLoadBalancer", || {
                elb.enable_availability_zones(name, removed)
            })
            .await?;
            info!(load_balancer = %name, "re-enabled zones");
        }
    }
    Ok(())
}

/// Detach matching classic balancers from `config.az`
pub async fn fail_az(ctx: &ActionContext, config: &ElbConfig) -> Result<FailureRun<ElbRecord>> {
    if config.tags.is_empty() && config.lb_names.is_empty() {
        return Err(AzError::Validation(
            "tags or load balancer names are required to select classic load balancers".to_string(),
        ));
    }
    ctx.validate_zone(SERVICE, &config.az).await?;
    let store = ctx.store(SERVICE, config.state_path.as_deref())?;
    store.guard_overwrite(config.overwrite_state)?;

    let balancers = locate(ctx, &config.lb_names, &config.tags, &config.az).await?;
    if balancers.is_empty() {
        return Err(AzError::NoTargets {
            service: SERVICE,
            az: config.az.clone(),
        });
    }

    let default_vpc = ctx
        .query(SERVICE, "DescribeVpcs", || ctx.provider.ec2.default_vpc_id())
        .await?;

    let subnet_ids: HashSet<String> = balancers
        .iter()
        .filter(|lb| lb.vpc_id.is_some() && lb.vpc_id != default_vpc)
        .flat_map(|lb| lb.subnet_ids.iter().cloned())
        .collect();
    let zone_of: HashMap<String, String> = if subnet_ids.is_empty() {
        HashMap::new()
    } else {
        let filters = [Filter::new("subnet-id", subnet_ids)];
        ctx.query(SERVICE, "DescribeSubnets", || {
            ctx.provider.ec2.describe_subnets(&filters)
        })
        .await?
        .into_iter()
        .map(|s| (s.subnet_id, s.availability_zone))
        .collect()
    };

    let mut entry = StateEntry::new(SERVICE, &config.az, config.dry_run);
    let mut items = Vec::new();
    for lb in &balancers {
        match plan_balancer(lb, default_vpc.as_deref(), &zone_of, &config.az) {
            Ok(change) => items.push((
                lb.name.clone(),
                ElbRecord {
                    load_balancer_name: lb.name.clone(),
                    change,
                },
            )),
            Err(reason) => entry.outcomes.push(ExecutionResult::skipped(&lb.name, reason)),
        }
    }

    let provider = ctx.provider.clone();
    let retry = ctx.retry.clone();
    let dry_run = config.dry_run;
    let outcomes = ctx
        .executor
        .run(items, move |record: ElbRecord| {
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

/// Re-attach subnets and re-enable zones recorded by `fail_az`
pub async fn recover_az(ctx: &ActionContext, state_path: Option<&Path>) -> Result<RecoveryResult> {
    let store = ctx.store(SERVICE, state_path)?;
    let provider = ctx.provider.clone();
    let retry = ctx.retry.clone();

    recover_all(store, &ctx.executor, move |record: ElbRecord| {
        let provider = provider.clone();
        let retry = retry.clone();
        async move { reverse(&provider, &retry, &record).await }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balancer(vpc: Option<&str>, zones: &[&str], subnets: &[&str]) -> ClassicLoadBalancer {
        ClassicLoadBalancer {
            name: "web-clb".into(),
            availability_zones: zones.iter().map(|s| s.to_string()).collect(),
            subnet_ids: subnets.iter().map(|s| s.to_string()).collect(),
            vpc_id: vpc.map(str::to_string),
        }
    }

    fn zones() -> HashMap<String, String> {
        HashMap::from([
            ("subnet-a".to_string(), "us-east-1a".to_string()),
            ("subnet-b".to_string(), "us-east-1b".to_string()),
        ])
    }

    #[test]
    fn test_custom_vpc_detaches_subnets() {
        let lb = balancer(Some("vpc-app"), &["us-east-1a", "us-east-1b"], &["subnet-a", "subnet-b"]);
        assert_eq!(
            plan_balancer(&lb, Some("vpc-default"), &zones(), "us-east-1a").unwrap(),
            ElbChange::Subnets {
                before: vec!["subnet-a".into(), "subnet-b".into()],
                removed: vec!["subnet-a".into()],
            }
        );
    }

    #[test]
    fn test_default_vpc_disables_zone() {
        let lb = balancer(Some("vpc-default"), &["us-east-1a", "us-east-1b"], &["subnet-a", "subnet-b"]);
        assert!(matches!(
            plan_balancer(&lb, Some("vpc-default"), &zones(), "us-east-1b").unwrap(),
            ElbChange::Zones { ref removed, .. } if removed == &vec!["us-east-1b".to_string()]
        ));
    }

    #[test]
    fn test_last_zone_or_subnet_is_kept() {
        let lb = balancer(None, &["us-east-1a"], &[]);
        assert!(plan_balancer(&lb, None, &zones(), "us-east-1a").is_err());

        let lb = balancer(Some("vpc-app"), &["us-east-1a"], &["subnet-a"]);
        assert!(plan_balancer(&lb, None, &zones(), "us-east-1a").is_err());
    }
}
