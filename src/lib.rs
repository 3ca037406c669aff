/*!
 * az-failure - Availability Zone failure simulation for AWS managed services
 *
 * Induces a controlled, reversible zone outage per service:
 * - Auto Scaling groups lose their subnets in the zone (or drop to zero)
 * - EC2 subnets are swapped onto a deny-all network ACL, or instances stopped
 * - Classic and application load balancers stop routing to the zone
 * - RDS, ElastiCache and Amazon MQ are forced to fail over
 * - EKS node groups get the ASG and EC2 treatment combined
 *
 * Every reversible change is recorded in a JSON state file so `recover_az`
 * can undo exactly what `fail_az` did.
 *
 * Version: 0.3.0
 */

pub mod actions;
pub mod backend;
pub mod cli_style;
pub mod config;
pub mod core;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod recovery;
pub mod services;
pub mod state;

#[cfg(feature = "aws-native")]
pub mod protocol;

// Re-export commonly used types
pub use actions::{fail_az, recover_az, FailRequest, FailureReport, RecoverRequest};
pub use backend::{Provider, ProviderError};
pub use config::{AppConfig, FailureType};
pub use core::{ExecutionResult, ExecutionStatus, RunSummary};
pub use error::{AzError, Result};
pub use recovery::{RecoveryResult, RecoveryStatus};
pub use services::{ActionContext, ServiceKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
