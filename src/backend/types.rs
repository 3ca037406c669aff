//! Inventory records returned by provider queries
//!
//! These are ephemeral snapshots: fetched fresh on every run and never
//! cached between invocations.

use serde::{Deserialize, Serialize};

/// A resource tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A named attribute filter, e.g. `availability-zone = [us-east-1a]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    #[serde(rename = "Values", alias = "values")]
    pub values: Vec<String>,
}

impl Filter {
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// Auto Scaling
// ============================================================================

/// Capacity settings of an auto scaling group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub min_size: i32,
    pub max_size: i32,
    pub desired_capacity: i32,
}

impl Capacity {
    pub const ZERO: Capacity = Capacity {
        min_size: 0,
        max_size: 0,
        desired_capacity: 0,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsgInstance {
    pub instance_id: String,
    pub availability_zone: String,
    pub lifecycle_state: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoScalingGroup {
    pub name: String,
    pub availability_zones: Vec<String>,
    /// Subnets parsed from the group's VPC zone identifier
    pub subnet_ids: Vec<String>,
    pub capacity: Capacity,
    pub suspended_processes: Vec<String>,
    pub tags: Vec<Tag>,
    pub instances: Vec<AsgInstance>,
}

// ============================================================================
// EC2
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    pub subnet_id: String,
    pub vpc_id: String,
    pub availability_zone: String,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclAssociation {
    pub association_id: String,
    pub subnet_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAcl {
    pub network_acl_id: String,
    pub vpc_id: String,
    pub is_default: bool,
    pub tags: Vec<Tag>,
    pub associations: Vec<AclAssociation>,
}

/// Purchase model of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceLifecycle {
    Normal,
    Spot,
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub instance_id: String,
    pub availability_zone: String,
    pub state: String,
    pub lifecycle: InstanceLifecycle,
    pub spot_instance_request_id: Option<String>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpotRequestType {
    OneTime,
    Persistent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotRequest {
    pub request_id: String,
    pub request_type: SpotRequestType,
}

/// State transition reported by stop/terminate calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceStateChange {
    pub instance_id: String,
    pub previous_state: String,
    pub current_state: String,
}

// ============================================================================
// Load balancers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassicLoadBalancer {
    pub name: String,
    pub availability_zones: Vec<String>,
    pub subnet_ids: Vec<String>,
    pub vpc_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneMapping {
    pub zone_name: String,
    pub subnet_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerV2 {
    pub arn: String,
    pub name: String,
    /// `application`, `network` or `gateway`
    pub lb_type: String,
    /// `active`, `provisioning`, `active_impaired` or `failed`
    pub state: String,
    pub zones: Vec<ZoneMapping>,
}

// ============================================================================
// RDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbInstance {
    pub identifier: String,
    pub availability_zone: Option<String>,
    pub multi_az: bool,
    pub cluster_identifier: Option<String>,
    pub status: String,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbClusterMember {
    pub instance_identifier: String,
    pub is_writer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbCluster {
    pub identifier: String,
    pub multi_az: bool,
    pub members: Vec<DbClusterMember>,
    pub tags: Vec<Tag>,
}

// ============================================================================
// ElastiCache
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGroupMember {
    pub cache_cluster_id: String,
    pub preferred_availability_zone: Option<String>,
    /// `primary` or `replica`; only reported for cluster-mode disabled groups
    pub current_role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNodeGroup {
    pub node_group_id: String,
    pub members: Vec<NodeGroupMember>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationGroup {
    pub id: String,
    pub arn: String,
    pub status: String,
    pub cluster_enabled: bool,
    pub automatic_failover: bool,
    pub node_groups: Vec<CacheNodeGroup>,
}

// ============================================================================
// EKS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EksCluster {
    pub name: String,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nodegroup {
    pub cluster_name: String,
    pub name: String,
    pub subnet_ids: Vec<String>,
    pub auto_scaling_groups: Vec<String>,
}

// ============================================================================
// Amazon MQ
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broker {
    pub id: String,
    pub name: String,
    pub engine_type: String,
    pub deployment_mode: String,
    pub subnet_ids: Vec<String>,
    pub tags: Vec<Tag>,
}
