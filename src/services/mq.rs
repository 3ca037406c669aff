//! Amazon MQ strategy
//!
//! Active/standby ActiveMQ brokers with a subnet in the target zone are
//! rebooted, which moves the active instance to the standby. Nothing is
//! persisted.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{collect, finish, mutate, would, ActionContext, FailureRun, ServiceKind};
use crate::backend::{Broker, Filter, Tag};
use crate::config::MqConfig;
use crate::core::filter;
use crate::error::{AzError, Result};
use crate::state::{StateEntry, StateRecord};

const SERVICE: ServiceKind = ServiceKind::Mq;

pub const ENGINE_ACTIVEMQ: &str = "ActiveMQ";
pub const ACTIVE_STANDBY: &str = "ACTIVE_STANDBY_MULTI_AZ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerRecord {
    pub broker_id: String,
    pub broker_name: String,
}

impl StateRecord for BrokerRecord {
    fn resource_id(&self) -> String {
        self.broker_id.clone()
    }
}

/// Whether `broker` is an active/standby ActiveMQ broker carrying every tag
pub fn is_candidate(broker: &Broker, tags: &[Tag]) -> bool {
    broker.engine_type.eq_ignore_ascii_case(ENGINE_ACTIVEMQ)
        && broker.deployment_mode == ACTIVE_STANDBY
        && filter::tags_match(&broker.tags, tags)
}

/// Reboot matching brokers with a subnet in `config.az`
pub async fn fail_az(ctx: &ActionContext, config: &MqConfig) -> Result<FailureRun<BrokerRecord>> {
    if config.tags.is_empty() {
        return Err(AzError::Validation(
            "at least one tag is required to select brokers".to_string(),
        ));
    }
    ctx.validate_zone(SERVICE, &config.az).await?;

    let ids = ctx
        .query(SERVICE, "ListBrokers", || ctx.provider.mq.list_broker_ids())
        .await?;

    let mut candidates = Vec::new();
    for id in &ids {
        let broker = ctx
            .query(SERVICE, "DescribeBroker", || ctx.provider.mq.describe_broker(id))
            .await?;
        if is_candidate(&broker, &config.tags) {
            candidates.push(broker);
        }
    }

    let subnet_ids: Vec<String> = candidates
        .iter()
        .flat_map(|b| b.subnet_ids.iter().cloned())
        .collect();
    let in_zone = if subnet_ids.is_empty() {
        Default::default()
    } else {
        let filters = [Filter::new("subnet-id", subnet_ids)];
        let subnets = ctx
            .query(SERVICE, "DescribeSubnets", || {
                ctx.provider.ec2.describe_subnets(&filters)
            })
            .await?;
        filter::subnets_in_zone(&subnets, &config.az)
    };

    let items: Vec<(String, BrokerRecord)> = candidates
        .into_iter()
        .filter(|b| b.subnet_ids.iter().any(|s| in_zone.contains(s)))
        .map(|b| {
            (
                b.id.clone(),
                BrokerRecord {
                    broker_id: b.id,
                    broker_name: b.name,
                },
            )
        })
        .collect();

    if items.is_empty() {
        return Err(AzError::NoTargets {
            service: SERVICE,
            az: config.az.clone(),
        });
    }

    let mut entry = StateEntry::new(SERVICE, &config.az, config.dry_run);
    let provider = ctx.provider.clone();
    let retry = ctx.retry.clone();
    let dry_run = config.dry_run;
    let outcomes = ctx
        .executor
        .run(items, move |record: BrokerRecord| {
            let provider = provider.clone();
            let retry = retry.clone();
            async move {
                let id = record.broker_id.as_str();
                if dry_run {
                    would(id, format_args!("reboot broker {}", record.broker_name));
                } else {
                    mutate(&retry, id, "RebootBroker", || provider.mq.reboot_broker(id)).await?;
                    info!(broker = %record.broker_name, broker_id = %id, "rebooting broker");
                }
                Ok(record)
            }
        })
        .await;
    collect(&mut entry, outcomes);

    finish(entry, None)
}
