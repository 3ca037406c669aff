//! Provider abstraction over the cloud control plane
//!
//! Each managed service the engine touches is reached through one async
//! trait. Implementations must follow pagination tokens until exhausted and
//! report failures as [`ProviderError`], keeping "not found" and throttling
//! distinct from other errors.
//!
//! The traits are grouped into a cheap-to-clone [`Provider`] bundle that the
//! failure strategies receive.
//!
//! # Example Implementation
//!
//! ```ignore
//! use async_trait::async_trait;
//! use az_failure::backend::{MqApi, ProviderResult, Broker};
//!
//! struct StaticBrokers(Vec<Broker>);
//!
//! #[async_trait]
//! impl MqApi for StaticBrokers {
//!     async fn list_broker_ids(&self) -> ProviderResult<Vec<String>> {
//!         Ok(self.0.iter().map(|b| b.id.clone()).collect())
//!     }
//!     // ...
//! }
//! ```

pub mod error;
pub mod types;

pub use error::{ProviderError, ProviderResult};
pub use types::*;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Auto Scaling group operations
#[async_trait]
pub trait AutoScalingApi: Send + Sync {
    /// Describe groups by name, or every group in the region when `names` is empty
    async fn describe_groups(&self, names: &[String]) -> ProviderResult<Vec<AutoScalingGroup>>;

    /// Replace the group's subnet list (VPC zone identifier)
    async fn update_subnets(&self, group: &str, subnet_ids: &[String]) -> ProviderResult<()>;

    /// Set min/max/desired capacity
    async fn update_capacity(&self, group: &str, capacity: Capacity) -> ProviderResult<()>;

    async fn suspend_processes(&self, group: &str, processes: &[String]) -> ProviderResult<()>;

    async fn resume_processes(&self, group: &str, processes: &[String]) -> ProviderResult<()>;
}

/// EC2 networking and instance operations
#[async_trait]
pub trait Ec2Api: Send + Sync {
    /// Zone names available to the account in the configured region
    async fn describe_availability_zones(&self) -> ProviderResult<Vec<String>>;

    async fn describe_subnets(&self, filters: &[Filter]) -> ProviderResult<Vec<Subnet>>;

    /// Id of the region's default VPC, if one exists
    async fn default_vpc_id(&self) -> ProviderResult<Option<String>>;

    async fn describe_network_acls(&self, filters: &[Filter]) -> ProviderResult<Vec<NetworkAcl>>;

    /// Create an ACL in `vpc_id` and return its id
    async fn create_network_acl(&self, vpc_id: &str, tags: &[Tag]) -> ProviderResult<String>;

    /// Add a deny-all entry (all protocols, all ports, 0.0.0.0/0)
    async fn create_deny_all_entry(
        &self,
        network_acl_id: &str,
        rule_number: i32,
        egress: bool,
    ) -> ProviderResult<()>;

    /// Point an existing association at another ACL, returning the new association id
    async fn replace_network_acl_association(
        &self,
        association_id: &str,
        network_acl_id: &str,
    ) -> ProviderResult<String>;

    async fn delete_network_acl(&self, network_acl_id: &str) -> ProviderResult<()>;

    async fn describe_instances(&self, filters: &[Filter]) -> ProviderResult<Vec<Instance>>;

    async fn describe_spot_requests(&self, request_ids: &[String])
        -> ProviderResult<Vec<SpotRequest>>;

    async fn stop_instances(
        &self,
        instance_ids: &[String],
        force: bool,
    ) -> ProviderResult<Vec<InstanceStateChange>>;

    async fn terminate_instances(
        &self,
        instance_ids: &[String],
    ) -> ProviderResult<Vec<InstanceStateChange>>;

    async fn cancel_spot_requests(&self, request_ids: &[String]) -> ProviderResult<()>;
}

/// Classic Elastic Load Balancing operations
#[async_trait]
pub trait ClassicElbApi: Send + Sync {
    /// Describe balancers by name, or all of them when `names` is empty
    async fn describe_load_balancers(
        &self,
        names: &[String],
    ) -> ProviderResult<Vec<ClassicLoadBalancer>>;

    /// Tags for up to 20 balancers, keyed by name
    async fn describe_tags(&self, names: &[String]) -> ProviderResult<HashMap<String, Vec<Tag>>>;

    async fn detach_subnets(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()>;

    async fn attach_subnets(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()>;

    async fn disable_availability_zones(&self, name: &str, zones: &[String])
        -> ProviderResult<()>;

    async fn enable_availability_zones(&self, name: &str, zones: &[String]) -> ProviderResult<()>;
}

/// Elastic Load Balancing v2 operations
#[async_trait]
pub trait ElbV2Api: Send + Sync {
    /// Describe balancers by ARN, or all of them when `arns` is empty
    async fn describe_load_balancers(&self, arns: &[String]) -> ProviderResult<Vec<LoadBalancerV2>>;

    /// Tags for up to 20 balancers, keyed by ARN
    async fn describe_tags(&self, arns: &[String]) -> ProviderResult<HashMap<String, Vec<Tag>>>;

    async fn set_subnets(&self, arn: &str, subnet_ids: &[String]) -> ProviderResult<()>;
}

/// RDS operations
#[async_trait]
pub trait RdsApi: Send + Sync {
    async fn describe_db_instances(&self) -> ProviderResult<Vec<DbInstance>>;

    async fn describe_db_clusters(&self) -> ProviderResult<Vec<DbCluster>>;

    async fn reboot_db_instance(&self, identifier: &str, force_failover: bool)
        -> ProviderResult<()>;

    async fn failover_db_cluster(
        &self,
        identifier: &str,
        target_instance: Option<&str>,
    ) -> ProviderResult<()>;
}

/// ElastiCache operations
#[async_trait]
pub trait ElastiCacheApi: Send + Sync {
    /// Describe one replication group, or every group when `id` is `None`
    async fn describe_replication_groups(
        &self,
        id: Option<&str>,
    ) -> ProviderResult<Vec<ReplicationGroup>>;

    async fn list_tags(&self, arn: &str) -> ProviderResult<Vec<Tag>>;

    async fn test_failover(&self, replication_group_id: &str, node_group_id: &str)
        -> ProviderResult<()>;
}

/// EKS operations
#[async_trait]
pub trait EksApi: Send + Sync {
    async fn list_clusters(&self) -> ProviderResult<Vec<String>>;

    async fn describe_cluster(&self, name: &str) -> ProviderResult<EksCluster>;

    async fn list_nodegroups(&self, cluster: &str) -> ProviderResult<Vec<String>>;

    async fn describe_nodegroup(&self, cluster: &str, nodegroup: &str)
        -> ProviderResult<Nodegroup>;
}

/// Amazon MQ operations
#[async_trait]
pub trait MqApi: Send + Sync {
    async fn list_broker_ids(&self) -> ProviderResult<Vec<String>>;

    async fn describe_broker(&self, broker_id: &str) -> ProviderResult<Broker>;

    async fn reboot_broker(&self, broker_id: &str) -> ProviderResult<()>;
}

/// Bundle of service clients handed to the failure strategies
#[derive(Clone)]
pub struct Provider {
    pub autoscaling: Arc<dyn AutoScalingApi>,
    pub ec2: Arc<dyn Ec2Api>,
    pub elb: Arc<dyn ClassicElbApi>,
    pub elbv2: Arc<dyn ElbV2Api>,
    pub rds: Arc<dyn RdsApi>,
    pub elasticache: Arc<dyn ElastiCacheApi>,
    pub eks: Arc<dyn EksApi>,
    pub mq: Arc<dyn MqApi>,
}

impl Provider {
    /// Build a bundle where a single value serves every service
    pub fn uniform<T>(cloud: Arc<T>) -> Self
    where
        T: AutoScalingApi
            + Ec2Api
            + ClassicElbApi
            + ElbV2Api
            + RdsApi
            + ElastiCacheApi
            + EksApi
            + MqApi
            + 'static,
    {
        Self {
            autoscaling: cloud.clone(),
            ec2: cloud.clone(),
            elb: cloud.clone(),
            elbv2: cloud.clone(),
            rds: cloud.clone(),
            elasticache: cloud.clone(),
            eks: cloud.clone(),
            mq: cloud,
        }
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider").finish_non_exhaustive()
    }
}
