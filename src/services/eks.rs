//! EKS managed node group strategy
//!
//! Node groups of tagged clusters are failed through their Auto Scaling
//! groups (the ASG transformation), then through their subnets (network
//! failure) or their instances (instance failure) in the target zone.
//! Each node group gets its own state record so recovery can replay it
//! independently: subnet associations first, then the blackhole ACLs, then
//! the Auto Scaling groups.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

use super::ec2::{self, network, BlackholeAcl, InstanceRecord, SubnetRecord};
use super::{asg, finish, tolerate_missing, ActionContext, Applied, FailureRun, ServiceKind};
use crate::backend::{Filter, Nodegroup, Provider, Subnet};
use crate::config::{EksConfig, FailureType};
use crate::core::{filter, RetryPolicy};
use crate::error::{AzError, Result};
use crate::recovery::{recover_all, RecoveryResult};
use crate::state::{StateEntry, StateRecord};

const SERVICE: ServiceKind = ServiceKind::Eks;

/// Tag EC2 Auto Scaling puts on every instance it launches
const ASG_NAME_TAG: &str = "aws:autoscaling:groupName";

/// Everything changed on behalf of one node group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodegroupRecord {
    pub cluster_name: String,
    pub nodegroup_name: String,
    #[serde(default)]
    pub auto_scaling_groups: Vec<asg::AsgRecord>,
    #[serde(default)]
    pub subnets: Vec<SubnetRecord>,
    #[serde(default)]
    pub blackhole_acls: Vec<BlackholeAcl>,
    #[serde(default)]
    pub instances: Vec<InstanceRecord>,
}

impl NodegroupRecord {
    fn new(nodegroup: &Nodegroup) -> Self {
        Self {
            cluster_name: nodegroup.cluster_name.clone(),
            nodegroup_name: nodegroup.name.clone(),
            auto_scaling_groups: Vec::new(),
            subnets: Vec::new(),
            blackhole_acls: Vec::new(),
            instances: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.auto_scaling_groups.is_empty()
            && self.subnets.is_empty()
            && self.blackhole_acls.is_empty()
            && self.instances.is_empty()
    }
}

impl StateRecord for NodegroupRecord {
    fn resource_id(&self) -> String {
        format!("{}/{}", self.cluster_name, self.nodegroup_name)
    }
}

/// Node groups of every cluster carrying all the requested tags
async fn locate_nodegroups(ctx: &ActionContext, config: &EksConfig) -> Result<Vec<Nodegroup>> {
    let eks = &ctx.provider.eks;
    let names = ctx.query(SERVICE, "ListClusters", || eks.list_clusters()).await?;

    let mut nodegroups = Vec::new();
    for name in &names {
        let cluster = ctx
            .query(SERVICE, "DescribeCluster", || eks.describe_cluster(name))
            .await?;
        if !filter::tags_match(&cluster.tags, &config.tags) {
            debug!(cluster = %name, "cluster tags do not match");
            continue;
        }

        let ng_names = ctx
            .query(SERVICE, "ListNodegroups", || eks.list_nodegroups(name))
            .await?;
        for ng in &ng_names {
            nodegroups.push(
                ctx.query(SERVICE, "DescribeNodegroup", || eks.describe_nodegroup(name, ng))
                    .await?,
            );
        }
    }
    Ok(nodegroups)
}

/// Assign each item to the first node group claiming it
fn claim<'a, T, K, F>(nodegroups: &[Nodegroup], items: &'a [T], key: F) -> HashMap<String, Vec<&'a T>>
where
    K: AsRef<str>,
    F: Fn(&Nodegroup, &T) -> Option<K>,
{
    let mut claimed = HashSet::new();
    let mut by_nodegroup: HashMap<String, Vec<&T>> = HashMap::new();
    for ng in nodegroups {
        for item in items {
            if let Some(k) = key(ng, item) {
                if claimed.insert(k.as_ref().to_string()) {
                    by_nodegroup.entry(ng_key(ng)).or_default().push(item);
                }
            }
        }
    }
    by_nodegroup
}

fn ng_key(ng: &Nodegroup) -> String {
    format!("{}/{}", ng.cluster_name, ng.name)
}

/// Fail every node group of the tagged clusters in `config.az`
pub async fn fail_az(ctx: &ActionContext, config: &EksConfig) -> Result<FailureRun<NodegroupRecord>> {
    if config.tags.is_empty() {
        return Err(AzError::Validation(
            "at least one tag is required to select clusters".to_string(),
        ));
    }
    ctx.validate_zone(SERVICE, &config.az).await?;
    let store = ctx.store(SERVICE, config.state_path.as_deref())?;
    store.guard_overwrite(config.overwrite_state)?;

    let nodegroups = locate_nodegroups(ctx, config).await?;
    let asg_names: Vec<String> = nodegroups
        .iter()
        .flat_map(|ng| ng.auto_scaling_groups.iter().cloned())
        .collect();
    let groups = if asg_names.is_empty() {
        Vec::new()
    } else {
        asg::locate(ctx, SERVICE, &asg_names, &[], &config.az).await?
    };

    let spanning: HashSet<&str> = groups.iter().map(|g| g.name.as_str()).collect();
    let targets: Vec<Nodegroup> = nodegroups
        .into_iter()
        .filter(|ng| {
            ng.auto_scaling_groups
                .iter()
                .any(|name| spanning.contains(name.as_str()))
        })
        .collect();
    if targets.is_empty() {
        return Err(AzError::NoTargets {
            service: SERVICE,
            az: config.az.clone(),
        });
    }
    info!(nodegroups = targets.len(), az = %config.az, "node groups selected");

    let mut entry = StateEntry::new(SERVICE, &config.az, config.dry_run);
    let mut records: HashMap<String, NodegroupRecord> = targets
        .iter()
        .map(|ng| (ng_key(ng), NodegroupRecord::new(ng)))
        .collect();

    // Auto Scaling groups
    let zone_of = asg::subnet_zones(ctx, SERVICE, &groups).await?;
    let planned = asg::plan_all(&groups, &zone_of, &config.az, &mut entry.outcomes);
    let mut asgs = Applied::default();
    asgs.absorb(asg::apply_all(ctx, planned, config.dry_run).await);
    let owner: HashMap<&str, String> = targets
        .iter()
        .flat_map(|ng| ng.auto_scaling_groups.iter().map(move |a| (a.as_str(), ng_key(ng))))
        .collect();
    for record in asgs.records {
        if let Some(ng) = owner.get(record.group_name.as_str()) {
            if let Some(target) = records.get_mut(ng) {
                target.auto_scaling_groups.push(record);
            }
        }
    }
    entry.outcomes.extend(asgs.outcomes);

    match config.failure_type {
        FailureType::Network => {
            fail_network(ctx, config, &targets, &mut records, &mut entry).await?
        }
        FailureType::Instance => {
            fail_instances(ctx, config, &targets, &mut records, &mut entry).await?
        }
    }

    let mut resources: Vec<NodegroupRecord> =
        records.into_values().filter(|r| !r.is_empty()).collect();
    resources.sort_by_key(|r| r.resource_id());
    entry.resources = resources;

    finish(entry, Some(&store))
}

async fn fail_network(
    ctx: &ActionContext,
    config: &EksConfig,
    targets: &[Nodegroup],
    records: &mut HashMap<String, NodegroupRecord>,
    entry: &mut StateEntry<NodegroupRecord>,
) -> Result<()> {
    let mut ids: Vec<String> = targets
        .iter()
        .flat_map(|ng| ng.subnet_ids.iter().cloned())
        .collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(());
    }

    let filters = [
        Filter::new("subnet-id", ids),
        Filter::new("availability-zone", [config.az.as_str()]),
    ];
    let subnets = ctx
        .query(SERVICE, "DescribeSubnets", || {
            ctx.provider.ec2.describe_subnets(&filters)
        })
        .await?;

    let claimed = claim(targets, &subnets, |ng, s: &Subnet| {
        ng.subnet_ids.contains(&s.subnet_id).then(|| s.subnet_id.clone())
    });

    for ng in targets {
        let key = ng_key(ng);
        let Some(mine) = claimed.get(&key) else {
            continue;
        };
        let mine: Vec<Subnet> = mine.iter().map(|s| (*s).clone()).collect();
        let done = network::blackhole(ctx, SERVICE, &mine, config.dry_run).await?;

        if let Some(record) = records.get_mut(&key) {
            record.blackhole_acls.extend(done.acls);
            record.subnets.extend(done.subnets.records);
        }
        entry.outcomes.extend(done.subnets.outcomes);
    }
    Ok(())
}

async fn fail_instances(
    ctx: &ActionContext,
    config: &EksConfig,
    targets: &[Nodegroup],
    records: &mut HashMap<String, NodegroupRecord>,
    entry: &mut StateEntry<NodegroupRecord>,
) -> Result<()> {
    let asg_names: Vec<String> = targets
        .iter()
        .flat_map(|ng| ng.auto_scaling_groups.iter().cloned())
        .collect();
    if asg_names.is_empty() {
        return Ok(());
    }

    let filters = [
        Filter::new(format!("tag:{ASG_NAME_TAG}"), asg_names),
        Filter::new("availability-zone", [config.az.as_str()]),
        Filter::new("instance-state-name", ["pending", "running"]),
    ];
    let instances = ctx
        .query(SERVICE, "DescribeInstances", || {
            ctx.provider.ec2.describe_instances(&filters)
        })
        .await?;

    let claimed = claim(targets, &instances, |ng, i: &crate::backend::Instance| {
        i.tags
            .iter()
            .find(|t| t.key == ASG_NAME_TAG)
            .filter(|t| ng.auto_scaling_groups.contains(&t.value))
            .map(|_| i.instance_id.clone())
    });

    for ng in targets {
        let key = ng_key(ng);
        let Some(mine) = claimed.get(&key) else {
            continue;
        };
        let mine = mine.iter().map(|i| (*i).clone()).collect();
        let done = ec2::instance::fail_instances(ctx, SERVICE, mine, config.dry_run).await?;

        if let Some(record) = records.get_mut(&key) {
            record.instances.extend(done.records);
        }
        entry.outcomes.extend(done.outcomes);
    }
    Ok(())
}

/// Undo one node group: subnets, then ACLs, then Auto Scaling groups.
///
/// Parts that no longer exist count as reversed, so a record retained after
/// a partial recovery can be replayed.
async fn reverse(provider: &Provider, retry: &RetryPolicy, record: &NodegroupRecord) -> Result<()> {
    for subnet in &record.subnets {
        tolerate_missing(network::restore_subnet(provider, retry, subnet).await)?;
    }
    for acl in &record.blackhole_acls {
        tolerate_missing(network::delete_blackhole_acl(provider, retry, acl).await)?;
    }
    for group in &record.auto_scaling_groups {
        tolerate_missing(asg::reverse(provider, retry, group).await)?;
    }
    if !record.instances.is_empty() {
        debug!(
            nodegroup = %record.resource_id(),
            instances = record.instances.len(),
            "instances are replaced by their Auto Scaling groups"
        );
    }
    info!(nodegroup = %record.resource_id(), "node group recovered");
    Ok(())
}

/// Restore every node group recorded by `fail_az`
pub async fn recover_az(ctx: &ActionContext, state_path: Option<&Path>) -> Result<RecoveryResult> {
    let store = ctx.store(SERVICE, state_path)?;
    let provider = ctx.provider.clone();
    let retry = ctx.retry.clone();

    recover_all(store, &ctx.executor, move |record: NodegroupRecord| {
        let provider = provider.clone();
        let retry = retry.clone();
        async move { reverse(&provider, &retry, &record).await }
    })
    .await
}
