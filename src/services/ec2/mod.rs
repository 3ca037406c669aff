//! EC2 strategy
//!
//! Two failure types share one target-filter model:
//!
//! - `network`: matching subnets are swapped onto a deny-all ACL
//!   ([`network`])
//! - `instance`: matching pending/running instances are stopped or
//!   terminated depending on their lifecycle ([`instance`])

pub mod instance;
pub mod network;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::backend::{Filter, Provider};
use crate::config::{default_tags, Ec2Config, FailureType};
use crate::core::{filter, RetryPolicy};
use crate::error::{AzError, Result};
use crate::recovery::{RecoveryResult, RecoveryRun, RecoveryStart};
use crate::state::{StateEntry, StateRecord};

use super::{finish, ActionContext, FailureRun, ServiceKind};
pub use instance::{InstanceAction, InstanceRecord};
pub use network::{BlackholeAcl, SubnetRecord, BLACKHOLE_ACL_NAME};

const SERVICE: ServiceKind = ServiceKind::Ec2;

const AZ_FILTER: &str = "availability-zone";
const STATE_FILTER: &str = "instance-state-name";

/// One reversible (or reported) change made by the EC2 strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Ec2Record {
    Subnet(SubnetRecord),
    BlackholeAcl(BlackholeAcl),
    Instance(InstanceRecord),
}

impl StateRecord for Ec2Record {
    fn resource_id(&self) -> String {
        match self {
            Ec2Record::Subnet(s) => s.subnet_id.clone(),
            Ec2Record::BlackholeAcl(a) => a.network_acl_id.clone(),
            Ec2Record::Instance(i) => i.instance_id.clone(),
        }
    }
}

fn explicit_az(config: &Ec2Config) -> Option<&str> {
    config.az.as_deref().filter(|az| !az.trim().is_empty())
}

/// Compose the provider filters for `config`.
///
/// A zone must come from `az` or an `availability-zone` filter. Without a
/// `tag:` filter the default failure tag is required; instance mode only
/// considers pending and running instances.
pub fn target_filters(config: &Ec2Config) -> Result<Vec<Filter>> {
    let mut filters = config.filters.clone();
    let has_az_filter = filter::find_filter(&filters, AZ_FILTER).is_some();

    match explicit_az(config) {
        Some(az) if !has_az_filter => filters.push(Filter::new(AZ_FILTER, [az])),
        Some(_) => {}
        None if has_az_filter => {}
        None => {
            return Err(AzError::Validation(
                "an availability zone or an 'availability-zone' filter is required".to_string(),
            ))
        }
    }

    if !filter::has_tag_filter(&filters) {
        filters.extend(filter::tag_filters(&default_tags()));
    }

    if config.failure_type == FailureType::Instance
        && filter::find_filter(&filters, STATE_FILTER).is_none()
    {
        filters.push(Filter::new(STATE_FILTER, ["pending", "running"]));
    }

    Ok(filters)
}

/// Zones the filters target
fn target_zones(filters: &[Filter]) -> Vec<String> {
    filter::find_filter(filters, AZ_FILTER)
        .map(|f| f.values.clone())
        .unwrap_or_default()
}

/// Fail the target zone for matching subnets or instances
pub async fn fail_az(ctx: &ActionContext, config: &Ec2Config) -> Result<FailureRun<Ec2Record>> {
    let filters = target_filters(config)?;
    let zones = target_zones(&filters);
    ctx.validate_zones(SERVICE, &zones).await?;

    let store = ctx.store(SERVICE, config.state_path.as_deref())?;
    store.guard_overwrite(config.overwrite_state)?;

    let az = zones.join(",");
    let mut entry = StateEntry::new(SERVICE, &az, config.dry_run);

    match config.failure_type {
        FailureType::Network => {
            let subnets = ctx
                .query(SERVICE, "DescribeSubnets", || {
                    ctx.provider.ec2.describe_subnets(&filters)
                })
                .await?;
            if subnets.is_empty() {
                return Err(AzError::NoTargets { service: SERVICE, az });
            }

            let done = network::blackhole(ctx, SERVICE, &subnets, config.dry_run).await?;
            entry
                .resources
                .extend(done.acls.into_iter().map(Ec2Record::BlackholeAcl));
            done.subnets.into_entry(&mut entry, Ec2Record::Subnet);
        }
        FailureType::Instance => {
            let instances = ctx
                .query(SERVICE, "DescribeInstances", || {
                    ctx.provider.ec2.describe_instances(&filters)
                })
                .await?;
            if instances.is_empty() {
                return Err(AzError::NoTargets { service: SERVICE, az });
            }

            instance::fail_instances(ctx, SERVICE, instances, config.dry_run)
                .await?
                .into_entry(&mut entry, Ec2Record::Instance);
        }
    }

    finish(entry, Some(&store))
}

async fn reverse(provider: &Provider, retry: &RetryPolicy, record: Ec2Record) -> Result<()> {
    match &record {
        Ec2Record::Subnet(subnet) => network::restore_subnet(provider, retry, subnet).await,
        Ec2Record::BlackholeAcl(acl) => network::delete_blackhole_acl(provider, retry, acl).await,
        Ec2Record::Instance(instance) => Err(AzError::precondition(
            &instance.instance_id,
            "instances are not restarted",
        )),
    }
}

/// A blackhole ACL can go once no pending subnet still points at it
fn acl_released(record: &Ec2Record, pending: &[Ec2Record]) -> bool {
    let Ec2Record::BlackholeAcl(acl) = record else {
        return false;
    };
    !pending.iter().any(|other| {
        matches!(other, Ec2Record::Subnet(s) if s.blackhole_acl_id == acl.network_acl_id)
    })
}

/// Restore subnet associations, then delete the blackhole ACLs
pub async fn recover_az(ctx: &ActionContext, state_path: Option<&Path>) -> Result<RecoveryResult> {
    let store = ctx.store(SERVICE, state_path)?;
    let mut run = match RecoveryRun::<Ec2Record>::begin(store)? {
        RecoveryStart::Nothing(result) => return Ok(result),
        RecoveryStart::Ready(run) => run,
    };

    for acl_phase in [false, true] {
        let provider = ctx.provider.clone();
        let retry = ctx.retry.clone();
        run.phase(
            &ctx.executor,
            |record, pending| {
                if acl_phase {
                    acl_released(record, pending)
                } else {
                    !matches!(record, Ec2Record::BlackholeAcl(_))
                }
            },
            move |record: Ec2Record| {
                let provider = provider.clone();
                let retry = retry.clone();
                async move { reverse(&provider, &retry, record).await }
            },
        )
        .await;
    }

    run.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InstanceLifecycle;

    fn config(az: Option<&str>, filters: Vec<Filter>) -> Ec2Config {
        Ec2Config {
            az: az.map(str::to_string),
            filters,
            ..Ec2Config::default()
        }
    }

    #[test]
    fn test_zone_is_required() {
        let err = target_filters(&config(None, vec![])).unwrap_err();
        assert!(matches!(err, AzError::Validation(_)));

        let err = target_filters(&config(Some(" "), vec![])).unwrap_err();
        assert!(matches!(err, AzError::Validation(_)));
    }

    #[test]
    fn test_default_tag_and_zone_filters_added() {
        let filters = target_filters(&config(Some("us-east-1a"), vec![])).unwrap();
        assert_eq!(
            filters,
            vec![
                Filter::new("availability-zone", ["us-east-1a"]),
                Filter::new("tag:AZ_FAILURE", ["True"]),
            ]
        );
    }

    #[test]
    fn test_caller_filters_are_kept() {
        let filters = target_filters(&config(
            None,
            vec![
                Filter::new("availability-zone", ["us-west-2b"]),
                Filter::new("tag:Team", ["core"]),
            ],
        ))
        .unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(target_zones(&filters), vec!["us-west-2b".to_string()]);
    }

    #[test]
    fn test_instance_mode_limits_states() {
        let mut cfg = config(Some("us-east-1a"), vec![]);
        cfg.failure_type = FailureType::Instance;
        let filters = target_filters(&cfg).unwrap();
        assert_eq!(
            filter::find_filter(&filters, "instance-state-name").unwrap().values,
            vec!["pending".to_string(), "running".to_string()]
        );
    }

    #[test]
    fn test_acl_waits_for_its_subnets() {
        let acl = Ec2Record::BlackholeAcl(BlackholeAcl {
            network_acl_id: "acl-bh".into(),
            vpc_id: "vpc-1".into(),
        });
        let subnet = Ec2Record::Subnet(SubnetRecord {
            subnet_id: "subnet-1".into(),
            vpc_id: "vpc-1".into(),
            original_acl_id: "acl-1".into(),
            original_association_id: "aclassoc-1".into(),
            blackhole_acl_id: "acl-bh".into(),
            new_association_id: "aclassoc-2".into(),
        });

        assert!(!acl_released(&acl, &[subnet.clone(), acl.clone()]));
        assert!(acl_released(&acl, &[acl.clone()]));
        assert!(!acl_released(&subnet, &[]));
    }

    #[test]
    fn test_record_tagging() {
        let record = Ec2Record::Instance(InstanceRecord {
            instance_id: "i-1".into(),
            lifecycle: InstanceLifecycle::Spot,
            action: InstanceAction::Terminate,
            previous_state: "running".into(),
            spot_request_id: Some("sir-1".into()),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "instance");
        assert_eq!(json["action"], "terminate");
        assert_eq!(record.resource_id(), "i-1");
    }
}
