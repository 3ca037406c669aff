//! SDK configuration loading

use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::time::Duration;
use tracing::debug;

use crate::config::ProviderSettings;
use crate::error::{AzError, Result};

/// Load the shared SDK configuration every service client is built from.
///
/// SDK-level retries are disabled: throttling is retried by the engine's own
/// policy so that every call, SDK or not, backs off the same way.
pub async fn load_sdk_config(settings: &ProviderSettings) -> Result<SdkConfig> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    let region_provider = match settings.resolved_region() {
        Some(region) => RegionProviderChain::first_try(Region::new(region)),
        None => RegionProviderChain::default_provider(),
    };
    loader = loader.region(region_provider);

    if let Some(ref profile) = settings.profile {
        loader = loader.profile_name(profile);
    }

    if let Some(ref endpoint) = settings.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    let timeout_config = TimeoutConfig::builder()
        .operation_timeout(Duration::from_secs(settings.timeout_secs))
        .build();
    loader = loader
        .timeout_config(timeout_config)
        .retry_config(RetryConfig::disabled());

    let sdk_config = loader.load().await;
    let region = sdk_config.region().ok_or_else(|| {
        AzError::Validation(
            "no AWS region configured; pass --region or set AWS_REGION".to_string(),
        )
    })?;
    debug!(region = %region, profile = ?settings.profile, "loaded AWS configuration");

    Ok(sdk_config)
}
