//! Network ACL blackhole
//!
//! Per VPC, one ACL named `blackhole_nacl` is created with deny-all ingress
//! and egress entries. Every target subnet's ACL association is then pointed
//! at it. Recovery points each association back at the original ACL before
//! the blackhole ACLs are deleted.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::backend::{Filter, Provider, Subnet, Tag};
use crate::core::{with_retry, RetryPolicy};
use crate::error::{AzError, Result};
use crate::services::{mutate, would, ActionContext, Applied, ServiceKind};

/// Value of the `Name` tag carried by every blackhole ACL
pub const BLACKHOLE_ACL_NAME: &str = "blackhole_nacl";

/// Starting rule number of the deny-all entries
const DENY_ALL_RULE: i32 = 100;

const ENTRY_EXISTS: &str = "NetworkAclEntryAlreadyExists";

/// A subnet whose ACL association was swapped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetRecord {
    pub subnet_id: String,
    pub vpc_id: String,
    pub original_acl_id: String,
    pub original_association_id: String,
    pub blackhole_acl_id: String,
    pub new_association_id: String,
}

/// A blackhole ACL created during the failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackholeAcl {
    pub network_acl_id: String,
    pub vpc_id: String,
}

/// Current association of a target subnet
#[derive(Debug, Clone)]
struct Swap {
    subnet_id: String,
    vpc_id: String,
    acl_id: String,
    association_id: String,
}

/// Records produced by [`blackhole`]
#[derive(Debug, Default)]
pub(crate) struct Blackholed {
    pub acls: Vec<BlackholeAcl>,
    pub subnets: Applied<SubnetRecord>,
}

fn blackhole_tags() -> Vec<Tag> {
    vec![Tag::new("Name", BLACKHOLE_ACL_NAME)]
}

fn is_blackhole(tags: &[Tag]) -> bool {
    tags.iter()
        .any(|t| t.key == "Name" && t.value == BLACKHOLE_ACL_NAME)
}

/// Id placeholder for an ACL a dry run did not create
fn dry_run_acl_id(vpc_id: &str) -> String {
    format!("dry-run:{vpc_id}")
}

/// Swap the ACL of every subnet in `subnets` for a deny-all ACL
pub(crate) async fn blackhole(
    ctx: &ActionContext,
    service: ServiceKind,
    subnets: &[Subnet],
    dry_run: bool,
) -> Result<Blackholed> {
    let mut result = Blackholed::default();
    if subnets.is_empty() {
        return Ok(result);
    }

    let ids: Vec<String> = subnets.iter().map(|s| s.subnet_id.clone()).collect();
    let filters = [Filter::new("association.subnet-id", ids.iter().cloned())];
    let acls = ctx
        .query(service, "DescribeNetworkAcls", || {
            ctx.provider.ec2.describe_network_acls(&filters)
        })
        .await?;

    // subnet -> (acl, association, already blackholed)
    let mut current = HashMap::new();
    for acl in &acls {
        for assoc in &acl.associations {
            current.insert(
                assoc.subnet_id.clone(),
                (
                    acl.network_acl_id.clone(),
                    assoc.association_id.clone(),
                    is_blackhole(&acl.tags),
                ),
            );
        }
    }

    let mut by_vpc: BTreeMap<String, Vec<Swap>> = BTreeMap::new();
    for subnet in subnets {
        match current.get(&subnet.subnet_id) {
            None => result
                .subnets
                .skip(&subnet.subnet_id, "no network ACL association found"),
            Some((acl_id, _, true)) => result.subnets.skip(
                &subnet.subnet_id,
                format!("already associated with blackhole ACL {acl_id}"),
            ),
            Some((acl_id, association_id, false)) => {
                by_vpc.entry(subnet.vpc_id.clone()).or_default().push(Swap {
                    subnet_id: subnet.subnet_id.clone(),
                    vpc_id: subnet.vpc_id.clone(),
                    acl_id: acl_id.clone(),
                    association_id: association_id.clone(),
                })
            }
        }
    }

    if by_vpc.is_empty() {
        return Ok(result);
    }

    // Phase 1: one blackhole ACL per VPC
    let provider = ctx.provider.clone();
    let retry = ctx.retry.clone();
    let vpcs = by_vpc.keys().map(|v| (v.clone(), v.clone())).collect();
    let created = ctx
        .executor
        .run(vpcs, move |vpc_id: String| {
            let provider = provider.clone();
            let retry = retry.clone();
            async move {
                let acl_id = create_blackhole_acl(&provider, &retry, &vpc_id, dry_run).await?;
                Ok(BlackholeAcl {
                    network_acl_id: acl_id,
                    vpc_id,
                })
            }
        })
        .await;

    let mut acl_of_vpc = HashMap::new();
    for outcome in created {
        match outcome.result {
            Ok(acl) => {
                acl_of_vpc.insert(acl.vpc_id.clone(), acl.network_acl_id.clone());
                result.acls.push(acl);
            }
            Err(e) => {
                for swap in by_vpc.get(&outcome.resource_id).into_iter().flatten() {
                    result.subnets.fail(
                        &swap.subnet_id,
                        format!("blackhole ACL creation failed in {}: {}", outcome.resource_id, e),
                    );
                }
            }
        }
    }

    // Phase 2: swap each subnet's association
    let swaps: Vec<(String, (Swap, String))> = by_vpc
        .into_values()
        .flatten()
        .filter_map(|swap| {
            let acl = acl_of_vpc.get(&swap.vpc_id)?.clone();
            Some((swap.subnet_id.clone(), (swap, acl)))
        })
        .collect();

    let provider = ctx.provider.clone();
    let retry = ctx.retry.clone();
    let swapped = ctx
        .executor
        .run(swaps, move |(swap, acl_id): (Swap, String)| {
            let provider = provider.clone();
            let retry = retry.clone();
            async move { swap_association(&provider, &retry, swap, acl_id, dry_run).await }
        })
        .await;
    result.subnets.absorb(swapped);

    Ok(result)
}

async fn create_blackhole_acl(
    provider: &Provider,
    retry: &RetryPolicy,
    vpc_id: &str,
    dry_run: bool,
) -> Result<String> {
    let ec2 = &provider.ec2;

    if dry_run {
        would(vpc_id, "create blackhole network ACL with deny-all ingress and egress entries");
        return Ok(dry_run_acl_id(vpc_id));
    }

    let tags = blackhole_tags();
    let acl_id = mutate(retry, vpc_id, "CreateNetworkAcl", || {
        ec2.create_network_acl(vpc_id, &tags)
    })
    .await?;
    info!(vpc_id = %vpc_id, acl_id = %acl_id, "created blackhole network ACL");

    for egress in [false, true] {
        if let Err(e) = add_deny_all_entry(provider, retry, &acl_id, egress).await {
            if let Err(undo) = ec2.delete_network_acl(&acl_id).await {
                warn!(acl_id = %acl_id, "could not delete incomplete blackhole ACL: {}", undo);
            }
            return Err(e);
        }
    }

    Ok(acl_id)
}

/// Add a deny-all entry, stepping the rule number down on conflicts
async fn add_deny_all_entry(
    provider: &Provider,
    retry: &RetryPolicy,
    acl_id: &str,
    egress: bool,
) -> Result<()> {
    let ec2 = &provider.ec2;
    let mut rule = DENY_ALL_RULE;

    loop {
        let number = rule;
        let outcome = with_retry(retry, "CreateNetworkAclEntry", || {
            ec2.create_deny_all_entry(acl_id, number, egress)
        })
        .await;

        match outcome {
            Ok(()) => return Ok(()),
            Err(e) if e.code() == Some(ENTRY_EXISTS) && rule > 1 => {
                warn!(acl_id = %acl_id, rule, "network ACL entry exists; trying rule {}", rule - 1);
                rule -= 1;
            }
            Err(e) => return Err(AzError::mutation(acl_id, e)),
        }
    }
}

async fn swap_association(
    provider: &Provider,
    retry: &RetryPolicy,
    swap: Swap,
    blackhole_acl_id: String,
    dry_run: bool,
) -> Result<SubnetRecord> {
    let subnet_id = swap.subnet_id.as_str();

    let new_association_id = if dry_run {
        would(
            subnet_id,
            format_args!("replace network ACL {} with {}", swap.acl_id, blackhole_acl_id),
        );
        String::new()
    } else {
        let id = mutate(retry, subnet_id, "ReplaceNetworkAclAssociation", || {
            provider
                .ec2
                .replace_network_acl_association(&swap.association_id, &blackhole_acl_id)
        })
        .await?;
        info!(
            subnet_id = %subnet_id,
            from = %swap.acl_id,
            to = %blackhole_acl_id,
            "replaced network ACL association"
        );
        id
    };

    Ok(SubnetRecord {
        subnet_id: swap.subnet_id,
        vpc_id: swap.vpc_id,
        original_acl_id: swap.acl_id,
        original_association_id: swap.association_id,
        blackhole_acl_id,
        new_association_id,
    })
}

/// Point the subnet back at its original ACL
pub(crate) async fn restore_subnet(
    provider: &Provider,
    retry: &RetryPolicy,
    record: &SubnetRecord,
) -> Result<()> {
    let subnet_id = record.subnet_id.as_str();
    if record.new_association_id.is_empty() {
        return Err(AzError::precondition(
            subnet_id,
            "no association was recorded for this subnet",
        ));
    }

    mutate(retry, subnet_id, "ReplaceNetworkAclAssociation", || {
        provider
            .ec2
            .replace_network_acl_association(&record.new_association_id, &record.original_acl_id)
    })
    .await?;
    info!(subnet_id = %subnet_id, acl_id = %record.original_acl_id, "restored network ACL association");
    Ok(())
}

pub(crate) async fn delete_blackhole_acl(
    provider: &Provider,
    retry: &RetryPolicy,
    acl: &BlackholeAcl,
) -> Result<()> {
    let acl_id = acl.network_acl_id.as_str();
    mutate(retry, acl_id, "DeleteNetworkAcl", || {
        provider.ec2.delete_network_acl(acl_id)
    })
    .await?;
    info!(acl_id = %acl_id, vpc_id = %acl.vpc_id, "deleted blackhole network ACL");
    Ok(())
}
