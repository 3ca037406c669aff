//! ElastiCache strategy
//!
//! Triggers `TestFailover` on every node group whose primary lives in the
//! target zone. Cluster-mode disabled groups are discovered by tag;
//! cluster-mode enabled groups come from an explicit shard list. The
//! provider promotes a replica on its own, so nothing is persisted.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{collect, finish, mutate, would, ActionContext, FailureRun, ServiceKind};
use crate::backend::{Provider, ReplicationGroup};
use crate::config::{ElastiCacheConfig, ShardSelector};
use crate::core::{with_retry, ExecutionResult, RetryPolicy, Waiter};
use crate::error::{AzError, Result};
use crate::state::{StateEntry, StateRecord};

const SERVICE: ServiceKind = ServiceKind::ElastiCache;

const AVAILABLE: &str = "available";

/// One node group failover
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverRecord {
    pub replication_group_id: String,
    pub node_group_id: String,
}

impl StateRecord for FailoverRecord {
    fn resource_id(&self) -> String {
        format!("{}/{}", self.replication_group_id, self.node_group_id)
    }
}

/// Node group of a cluster-mode disabled `group` whose primary is in `az`
pub fn primary_in_zone(group: &ReplicationGroup, az: &str) -> Option<FailoverRecord> {
    if group.cluster_enabled || !group.automatic_failover {
        return None;
    }
    group.node_groups.iter().find_map(|ng| {
        ng.members
            .iter()
            .any(|m| {
                m.current_role.as_deref() == Some("primary")
                    && m.preferred_availability_zone.as_deref() == Some(az)
            })
            .then(|| FailoverRecord {
                replication_group_id: group.id.clone(),
                node_group_id: ng.node_group_id.clone(),
            })
    })
}

/// Shards of a cluster-mode enabled `group` with a selected member in `az`
pub fn selected_shards(group: &ReplicationGroup, selector: &ShardSelector, az: &str) -> Vec<FailoverRecord> {
    group
        .node_groups
        .iter()
        .filter(|ng| {
            ng.members.iter().any(|m| {
                selector.cache_cluster_ids.contains(&m.cache_cluster_id)
                    && m.preferred_availability_zone.as_deref() == Some(az)
            })
        })
        .map(|ng| FailoverRecord {
            replication_group_id: group.id.clone(),
            node_group_id: ng.node_group_id.clone(),
        })
        .collect()
}

async fn discover_tagged(
    ctx: &ActionContext,
    config: &ElastiCacheConfig,
) -> Result<Vec<FailoverRecord>> {
    let groups = ctx
        .query(SERVICE, "DescribeReplicationGroups", || {
            ctx.provider.elasticache.describe_replication_groups(None)
        })
        .await?;

    let mut records = Vec::new();
    for group in &groups {
        let Some(record) = primary_in_zone(group, &config.az) else {
            continue;
        };
        let tags = ctx
            .query(SERVICE, "ListTagsForResource", || {
                ctx.provider.elasticache.list_tags(&group.arn)
            })
            .await?;
        if crate::core::filter::tags_match(&tags, &config.tags) {
            records.push(record);
        }
    }
    Ok(records)
}

async fn discover_shards(
    ctx: &ActionContext,
    config: &ElastiCacheConfig,
    skipped: &mut Vec<ExecutionResult>,
) -> Result<Vec<FailoverRecord>> {
    let mut records = Vec::new();
    for selector in &config.replication_groups {
        let id = selector.replication_group_id.as_str();
        let described = with_retry(&ctx.retry, "DescribeReplicationGroups", || {
            ctx.provider.elasticache.describe_replication_groups(Some(id))
        })
        .await;

        let group = match described {
            Ok(groups) => groups.into_iter().next(),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(AzError::query(SERVICE, e)),
        };
        let Some(group) = group else {
            skipped.push(ExecutionResult::skipped(id, "replication group not found"));
            continue;
        };
        if !group.cluster_enabled {
            skipped.push(ExecutionResult::skipped(id, "replication group is not in cluster mode"));
            continue;
        }

        let shards = selected_shards(&group, selector, &config.az);
        if shards.is_empty() {
            skipped.push(ExecutionResult::skipped(
                id,
                format!("no selected shard member lies in {}", config.az),
            ));
        }
        records.extend(shards);
    }
    Ok(records)
}

async fn apply(
    provider: &Provider,
    retry: &RetryPolicy,
    waiter: Option<Waiter>,
    dry_run: bool,
    record: &FailoverRecord,
) -> Result<()> {
    let rg = record.replication_group_id.as_str();
    let ng = record.node_group_id.as_str();
    let resource_id = record.resource_id();

    if dry_run {
        would(&resource_id, "test failover of node group");
        return Ok(());
    }

    mutate(retry, &resource_id, "TestFailover", || {
        provider.elasticache.test_failover(rg, ng)
    })
    .await?;
    info!(replication_group = %rg, node_group = %ng, "failover started");

    if let Some(waiter) = waiter {
        let attempts = waiter
            .wait_until(&resource_id, || async {
                let groups = provider.elasticache.describe_replication_groups(Some(rg)).await?;
                Ok(groups.first().is_some_and(|g| g.status == AVAILABLE))
            })
            .await?;
        info!(replication_group = %rg, attempts, "replication group available again");
    }
    Ok(())
}

/// Fail over the node groups whose primary is in `config.az`
pub async fn fail_az(
    ctx: &ActionContext,
    config: &ElastiCacheConfig,
) -> Result<FailureRun<FailoverRecord>> {
    if config.tags.is_empty() && config.replication_groups.is_empty() {
        return Err(AzError::Validation(
            "tags or replication groups are required to select caches".to_string(),
        ));
    }
    ctx.validate_zone(SERVICE, &config.az).await?;

    let mut entry = StateEntry::new(SERVICE, &config.az, config.dry_run);
    let records = if config.replication_groups.is_empty() {
        discover_tagged(ctx, config).await?
    } else {
        discover_shards(ctx, config, &mut entry.outcomes).await?
    };

    if records.is_empty() && entry.outcomes.is_empty() {
        return Err(AzError::NoTargets {
            service: SERVICE,
            az: config.az.clone(),
        });
    }

    let provider = ctx.provider.clone();
    let retry = ctx.retry.clone();
    let waiter = config.wait_for_recovery.then_some(ctx.waiter);
    let dry_run = config.dry_run;
    let items = records.into_iter().map(|r| (r.resource_id(), r)).collect();
    let outcomes = ctx
        .executor
        .run(items, move |record: FailoverRecord| {
            let provider = provider.clone();
            let retry = retry.clone();
            async move {
                apply(&provider, &retry, waiter, dry_run, &record).await?;
                Ok(record)
            }
        })
        .await;
    collect(&mut entry, outcomes);

    finish(entry, None)
}
