//! RDS strategy
//!
//! Multi-AZ instances whose primary sits in the target zone are rebooted with
//! forced failover. Aurora clusters whose writer sits in the target zone fail
//! over to a reader elsewhere. The provider reverses both on its own, so
//! nothing is persisted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use super::{collect, finish, mutate, would, ActionContext, FailureRun, ServiceKind};
use crate::backend::{DbCluster, DbInstance, Provider, Tag};
use crate::config::RdsConfig;
use crate::core::{filter, ExecutionResult, RetryPolicy};
use crate::error::{AzError, Result};
use crate::state::{StateEntry, StateRecord};

const SERVICE: ServiceKind = ServiceKind::Rds;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RdsRecord {
    /// Instance rebooted with forced failover
    Instance { identifier: String },
    /// Cluster failed over, optionally to a chosen reader
    Cluster {
        identifier: String,
        writer: String,
        target: Option<String>,
    },
}

impl StateRecord for RdsRecord {
    fn resource_id(&self) -> String {
        match self {
            RdsRecord::Instance { identifier } | RdsRecord::Cluster { identifier, .. } => {
                identifier.clone()
            }
        }
    }
}

/// Standalone Multi-AZ instances with their primary in `az`
pub fn select_instances<'a>(instances: &'a [DbInstance], tags: &[Tag], az: &str) -> Vec<&'a DbInstance> {
    instances
        .iter()
        .filter(|db| db.availability_zone.as_deref() == Some(az))
        .filter(|db| db.multi_az)
        .filter(|db| db.cluster_identifier.is_none())
        .filter(|db| filter::tags_match(&db.tags, tags))
        .collect()
}

/// Plan a failover for `cluster`.
///
/// `zone_of` maps instance identifiers to their zone. Returns `None` when the
/// cluster does not qualify, or the record with its writer and the reader
/// outside `az` to promote (if any).
pub fn plan_cluster(
    cluster: &DbCluster,
    zone_of: &HashMap<String, String>,
    tags: &[Tag],
    az: &str,
) -> Option<RdsRecord> {
    if !cluster.multi_az || !filter::tags_match(&cluster.tags, tags) {
        return None;
    }

    let writer = cluster.members.iter().find(|m| m.is_writer)?;
    if zone_of.get(&writer.instance_identifier).map(String::as_str) != Some(az) {
        return None;
    }

    let target = cluster
        .members
        .iter()
        .filter(|m| !m.is_writer)
        .find(|m| {
            zone_of
                .get(&m.instance_identifier)
                .is_some_and(|zone| zone != az)
        })
        .map(|m| m.instance_identifier.clone());

    Some(RdsRecord::Cluster {
        identifier: cluster.identifier.clone(),
        writer: writer.instance_identifier.clone(),
        target,
    })
}

async fn apply(provider: &Provider, retry: &RetryPolicy, dry_run: bool, record: &RdsRecord) -> Result<()> {
    let rds = &provider.rds;

    match record {
        RdsRecord::Instance { identifier } => {
            let id = identifier.as_str();
            if dry_run {
                would(id, "reboot with forced failover");
                return Ok(());
            }
            mutate(retry, id, "RebootDBInstance", || rds.reboot_db_instance(id, true)).await?;
            info!(db_instance = %id, "rebooting with forced failover");
        }
        RdsRecord::Cluster {
            identifier, target, ..
        } => {
            let id = identifier.as_str();
            let target = target.as_deref();
            if dry_run {
                would(
                    id,
                    format_args!("fail over cluster to {}", target.unwrap_or("any reader")),
                );
                return Ok(());
            }
            mutate(retry, id, "FailoverDBCluster", || rds.failover_db_cluster(id, target)).await?;
            info!(db_cluster = %id, target = ?target, "failing over cluster");
        }
    }
    Ok(())
}

/// Fail over matching instances and clusters away from `config.az`
pub async fn fail_az(ctx: &ActionContext, config: &RdsConfig) -> Result<FailureRun<RdsRecord>> {
    if config.tags.is_empty() {
        return Err(AzError::Validation(
            "at least one tag is required to select databases".to_string(),
        ));
    }
    ctx.validate_zone(SERVICE, &config.az).await?;

    let instances = ctx
        .query(SERVICE, "DescribeDBInstances", || {
            ctx.provider.rds.describe_db_instances()
        })
        .await?;
    let clusters = ctx
        .query(SERVICE, "DescribeDBClusters", || {
            ctx.provider.rds.describe_db_clusters()
        })
        .await?;

    let zone_of: HashMap<String, String> = instances
        .iter()
        .filter_map(|db| Some((db.identifier.clone(), db.availability_zone.clone()?)))
        .collect();

    let mut entry = StateEntry::new(SERVICE, &config.az, config.dry_run);
    let mut items: Vec<(String, RdsRecord)> = select_instances(&instances, &config.tags, &config.az)
        .into_iter()
        .map(|db| {
            (
                db.identifier.clone(),
                RdsRecord::Instance {
                    identifier: db.identifier.clone(),
                },
            )
        })
        .collect();

    for cluster in &clusters {
        if let Some(record) = plan_cluster(cluster, &zone_of, &config.tags, &config.az) {
            if let RdsRecord::Cluster { target: None, .. } = &record {
                entry.outcomes.push(ExecutionResult::skipped(
                    &cluster.identifier,
                    format!("no reader outside {} to promote", config.az),
                ));
                continue;
            }
            items.push((cluster.identifier.clone(), record));
        }
    }

    if items.is_empty() && entry.outcomes.is_empty() {
        return Err(AzError::NoTargets {
            service: SERVICE,
            az: config.az.clone(),
        });
    }

    let provider = ctx.provider.clone();
    let retry = ctx.retry.clone();
    let dry_run = config.dry_run;
    let outcomes = ctx
        .executor
        .run(items, move |record: RdsRecord| {
            let provider = provider.clone();
            let retry = retry.clone();
            async move {
                apply(&provider, &retry, dry_run, &record).await?;
                Ok(record)
            }
        })
        .await;
    collect(&mut entry, outcomes);

    finish(entry, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DbClusterMember;

    fn tags() -> Vec<Tag> {
        vec![Tag::new("AZ_FAILURE", "True")]
    }

    fn db(id: &str, az: &str, multi_az: bool, cluster: Option<&str>) -> DbInstance {
        DbInstance {
            identifier: id.into(),
            availability_zone: Some(az.into()),
            multi_az,
            cluster_identifier: cluster.map(str::to_string),
            status: "available".into(),
            tags: tags(),
        }
    }

    #[test]
    fn test_instance_selection() {
        let instances = vec![
            db("primary-a", "us-east-1a", true, None),
            db("single-a", "us-east-1a", false, None),
            db("primary-b", "us-east-1b", true, None),
            db("aurora-a", "us-east-1a", true, Some("aurora")),
        ];
        let selected = select_instances(&instances, &tags(), "us-east-1a");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].identifier, "primary-a");
    }

    #[test]
    fn test_cluster_fails_over_to_other_zone() {
        let cluster = DbCluster {
            identifier: "aurora".into(),
            multi_az: true,
            members: vec![
                DbClusterMember {
                    instance_identifier: "w".into(),
                    is_writer: true,
                },
                DbClusterMember {
                    instance_identifier: "r-same".into(),
                    is_writer: false,
                },
                DbClusterMember {
                    instance_identifier: "r-other".into(),
                    is_writer: false,
                },
            ],
            tags: tags(),
        };
        let zones = HashMap::from([
            ("w".to_string(), "us-east-1a".to_string()),
            ("r-same".to_string(), "us-east-1a".to_string()),
            ("r-other".to_string(), "us-east-1b".to_string()),
        ]);

        assert_eq!(
            plan_cluster(&cluster, &zones, &tags(), "us-east-1a"),
            Some(RdsRecord::Cluster {
                identifier: "aurora".into(),
                writer: "w".into(),
                target: Some("r-other".into()),
            })
        );
        assert_eq!(plan_cluster(&cluster, &zones, &tags(), "us-east-1b"), None);
    }
}
