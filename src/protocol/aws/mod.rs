//! AWS provider built on the official SDK
//!
//! One [`AwsCloud`] holds a client per service and implements every
//! [`crate::backend`] trait, following pagination markers until exhausted.

mod autoscaling;
mod client;
mod convert;
mod ec2;
mod eks;
mod elasticache;
mod elb;
mod elbv2;
mod error;
mod mq;
mod rds;

pub use client::load_sdk_config;

use aws_config::SdkConfig;
use std::sync::Arc;
use tracing::info;

use crate::backend::Provider;
use crate::config::ProviderSettings;
use crate::error::Result;

/// SDK clients for every service the engine touches
#[derive(Clone)]
pub struct AwsCloud {
    autoscaling: aws_sdk_autoscaling::Client,
    ec2: aws_sdk_ec2::Client,
    elb: aws_sdk_elasticloadbalancing::Client,
    elbv2: aws_sdk_elasticloadbalancingv2::Client,
    rds: aws_sdk_rds::Client,
    elasticache: aws_sdk_elasticache::Client,
    eks: aws_sdk_eks::Client,
    mq: aws_sdk_mq::Client,
}

impl AwsCloud {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            autoscaling: aws_sdk_autoscaling::Client::new(sdk_config),
            ec2: aws_sdk_ec2::Client::new(sdk_config),
            elb: aws_sdk_elasticloadbalancing::Client::new(sdk_config),
            elbv2: aws_sdk_elasticloadbalancingv2::Client::new(sdk_config),
            rds: aws_sdk_rds::Client::new(sdk_config),
            elasticache: aws_sdk_elasticache::Client::new(sdk_config),
            eks: aws_sdk_eks::Client::new(sdk_config),
            mq: aws_sdk_mq::Client::new(sdk_config),
        }
    }
}

/// Build a [`Provider`] talking to AWS with the given settings
pub async fn connect(settings: &ProviderSettings) -> Result<Provider> {
    let sdk_config = load_sdk_config(settings).await?;
    info!(
        region = ?sdk_config.region(),
        endpoint = ?settings.endpoint_url,
        "connected AWS provider"
    );
    Ok(Provider::uniform(Arc::new(AwsCloud::new(&sdk_config))))
}
