//! Instance stop/terminate
//!
//! The action depends on the purchase model: on-demand instances are force
//! stopped, spot instances backed by a persistent request are stopped, and
//! one-time spot instances have their request cancelled before they are
//! terminated. Scheduled instances are not supported.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::backend::{Instance, InstanceLifecycle, Provider, SpotRequestType};
use crate::core::RetryPolicy;
use crate::error::Result;
use crate::services::{mutate, would, ActionContext, Applied, ServiceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceAction {
    Stop,
    Terminate,
}

/// An instance that was stopped or terminated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub lifecycle: InstanceLifecycle,
    pub action: InstanceAction,
    pub previous_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_request_id: Option<String>,
}

/// Decide what happens to `instance`; `Err` carries the skip reason
pub fn plan_instance(
    instance: &Instance,
    spot_types: &HashMap<String, SpotRequestType>,
) -> std::result::Result<InstanceAction, String> {
    match instance.lifecycle {
        InstanceLifecycle::Normal => Ok(InstanceAction::Stop),
        InstanceLifecycle::Scheduled => Err("scheduled instances are not supported".to_string()),
        InstanceLifecycle::Spot => {
            let request = instance
                .spot_instance_request_id
                .as_deref()
                .ok_or_else(|| "spot instance has no spot request".to_string())?;
            match spot_types.get(request) {
                Some(SpotRequestType::Persistent) => Ok(InstanceAction::Stop),
                Some(SpotRequestType::OneTime) => Ok(InstanceAction::Terminate),
                None => Err(format!("spot request {request} not found")),
            }
        }
    }
}

/// Stop or terminate every instance in `instances`
pub(crate) async fn fail_instances(
    ctx: &ActionContext,
    service: ServiceKind,
    instances: Vec<Instance>,
    dry_run: bool,
) -> Result<Applied<InstanceRecord>> {
    let mut applied = Applied::default();
    if instances.is_empty() {
        return Ok(applied);
    }

    let request_ids: Vec<String> = instances
        .iter()
        .filter(|i| i.lifecycle == InstanceLifecycle::Spot)
        .filter_map(|i| i.spot_instance_request_id.clone())
        .collect();

    let spot_types: HashMap<String, SpotRequestType> = if request_ids.is_empty() {
        HashMap::new()
    } else {
        ctx.query(service, "DescribeSpotInstanceRequests", || {
            ctx.provider.ec2.describe_spot_requests(&request_ids)
        })
        .await?
        .into_iter()
        .map(|r| (r.request_id, r.request_type))
        .collect()
    };

    let mut planned = Vec::new();
    for instance in instances {
        match plan_instance(&instance, &spot_types) {
            Ok(action) => planned.push((
                instance.instance_id.clone(),
                InstanceRecord {
                    instance_id: instance.instance_id,
                    lifecycle: instance.lifecycle,
                    action,
                    previous_state: instance.state,
                    spot_request_id: instance.spot_instance_request_id,
                },
            )),
            Err(reason) => applied.skip(&instance.instance_id, reason),
        }
    }

    let provider = ctx.provider.clone();
    let retry = ctx.retry.clone();
    let outcomes = ctx
        .executor
        .run(planned, move |record: InstanceRecord| {
            let provider = provider.clone();
            let retry = retry.clone();
            async move {
                apply(&provider, &retry, &record, dry_run).await?;
                Ok(record)
            }
        })
        .await;
    applied.absorb(outcomes);

    Ok(applied)
}

async fn apply(
    provider: &Provider,
    retry: &RetryPolicy,
    record: &InstanceRecord,
    dry_run: bool,
) -> Result<()> {
    let id = record.instance_id.as_str();
    let ec2 = &provider.ec2;
    let ids = [record.instance_id.clone()];

    match record.action {
        InstanceAction::Stop => {
            if dry_run {
                would(id, format_args!("force stop {} instance", lifecycle_name(record.lifecycle)));
                return Ok(());
            }
            let changes = mutate(retry, id, "StopInstances", || ec2.stop_instances(&ids, true)).await?;
            log_changes(id, "stopping", &changes);
        }
        InstanceAction::Terminate => {
            let requests: Vec<String> = record.spot_request_id.iter().cloned().collect();
            if dry_run {
                would(id, format_args!("cancel spot request(s) {:?} and terminate", requests));
                return Ok(());
            }
            if !requests.is_empty() {
                mutate(retry, id, "CancelSpotInstanceRequests", || {
                    ec2.cancel_spot_requests(&requests)
                })
                .await?;
            }
            let changes = mutate(retry, id, "TerminateInstances", || ec2.terminate_instances(&ids)).await?;
            log_changes(id, "terminating", &changes);
        }
    }
    Ok(())
}

fn lifecycle_name(lifecycle: InstanceLifecycle) -> &'static str {
    match lifecycle {
        InstanceLifecycle::Normal => "on-demand",
        InstanceLifecycle::Spot => "spot",
        InstanceLifecycle::Scheduled => "scheduled",
    }
}

fn log_changes(id: &str, verb: &str, changes: &[crate::backend::InstanceStateChange]) {
    for change in changes {
        info!(
            instance_id = %id,
            from = %change.previous_state,
            to = %change.current_state,
            "{} instance",
            verb
        );
    }
}
