//! In-memory cloud used by the integration tests
//!
//! Holds a small inventory behind a mutex, applies mutations to it the way
//! the control plane would, and logs every mutating call. Failures and
//! throttling can be injected per operation.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use az_failure::backend::*;
use az_failure::core::{Executor, RetryPolicy, Waiter};
use az_failure::ActionContext;

pub const REGION_ZONES: [&str; 3] = ["us-east-1a", "us-east-1b", "us-east-1c"];

/// Zone letter -> subnet id used by the fixtures
pub fn subnet_id(zone: &str) -> String {
    format!("subnet-{}", zone.chars().last().unwrap_or('x'))
}

pub fn failure_tag() -> Tag {
    Tag::new("AZ_FAILURE", "True")
}

#[derive(Default)]
pub struct Inventory {
    pub zones: Vec<String>,
    pub subnets: Vec<Subnet>,
    pub default_vpc: Option<String>,
    pub acls: Vec<NetworkAcl>,
    pub acl_entries: HashSet<(String, i32, bool)>,
    pub instances: Vec<Instance>,
    pub spot_requests: Vec<SpotRequest>,
    pub groups: Vec<AutoScalingGroup>,
    pub classic: Vec<ClassicLoadBalancer>,
    pub classic_tags: HashMap<String, Vec<Tag>>,
    pub albs: Vec<LoadBalancerV2>,
    pub alb_tags: HashMap<String, Vec<Tag>>,
    pub db_instances: Vec<DbInstance>,
    pub db_clusters: Vec<DbCluster>,
    pub replication_groups: Vec<ReplicationGroup>,
    pub cache_tags: HashMap<String, Vec<Tag>>,
    pub clusters: Vec<EksCluster>,
    pub nodegroups: Vec<Nodegroup>,
    pub brokers: Vec<Broker>,
    next_id: u32,
}

impl Inventory {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:04}", self.next_id)
    }

    fn zone_of(&self, subnet: &str) -> Option<String> {
        self.subnets
            .iter()
            .find(|s| s.subnet_id == subnet)
            .map(|s| s.availability_zone.clone())
    }

    fn zones_of(&self, subnets: &[String]) -> Vec<String> {
        let mut zones: Vec<String> = subnets.iter().filter_map(|s| self.zone_of(s)).collect();
        zones.sort();
        zones.dedup();
        zones
    }
}

#[derive(Default)]
pub struct MockCloud {
    pub inventory: Mutex<Inventory>,
    mutations: Mutex<Vec<String>>,
    failures: Mutex<HashMap<(String, String), ProviderError>>,
    throttles: Mutex<HashMap<String, u32>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl MockCloud {
    /// Three zones, one subnet per zone in `vpc-main`, each on its own ACL
    pub fn new() -> Arc<Self> {
        let cloud = Self::default();
        {
            let mut inv = cloud.inventory.lock().unwrap();
            inv.zones = REGION_ZONES.iter().map(|z| z.to_string()).collect();
            inv.default_vpc = Some("vpc-default".to_string());
            for zone in REGION_ZONES {
                let id = subnet_id(zone);
                inv.subnets.push(Subnet {
                    subnet_id: id.clone(),
                    vpc_id: "vpc-main".to_string(),
                    availability_zone: zone.to_string(),
                    tags: vec![failure_tag()],
                });
                inv.acls.push(NetworkAcl {
                    network_acl_id: format!("acl-{}", &id[7..]),
                    vpc_id: "vpc-main".to_string(),
                    is_default: false,
                    tags: vec![],
                    associations: vec![AclAssociation {
                        association_id: format!("aclassoc-{}", &id[7..]),
                        subnet_id: id,
                    }],
                });
            }
        }
        Arc::new(cloud)
    }

    pub fn provider(self: &Arc<Self>) -> Provider {
        Provider::uniform(self.clone())
    }

    /// Context with fast retries and waits, writing state under `dir`
    pub fn context(self: &Arc<Self>, dir: &Path) -> ActionContext {
        ActionContext::new(self.provider())
            .with_state_dir(dir)
            .with_executor(Executor::new(4))
            .with_retry(RetryPolicy {
                max_attempts: 4,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                ..RetryPolicy::default()
            })
            .with_waiter(Waiter::new(Duration::from_millis(1), 3))
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut Inventory) -> T) -> T {
        f(&mut self.inventory.lock().unwrap())
    }

    /// Every mutating call so far, as `Operation resource`
    pub fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn clear_mutations(&self) {
        self.mutations.lock().unwrap().clear();
    }

    /// Number of calls (successful or not) made to `operation`
    pub fn calls(&self, operation: &str) -> u32 {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    /// Make every `operation` on `resource` fail with `error`
    pub fn fail_on(&self, operation: &str, resource: &str, error: ProviderError) {
        self.failures
            .lock()
            .unwrap()
            .insert((operation.to_string(), resource.to_string()), error);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Throttle the next `times` calls to `operation`
    pub fn throttle(&self, operation: &str, times: u32) {
        self.throttles
            .lock()
            .unwrap()
            .insert(operation.to_string(), times);
    }

    fn check(&self, operation: &str, resource: &str) -> ProviderResult<()> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default() += 1;

        if let Some(left) = self.throttles.lock().unwrap().get_mut(operation) {
            if *left > 0 {
                *left -= 1;
                return Err(ProviderError::throttled(operation));
            }
        }
        if let Some(err) = self
            .failures
            .lock()
            .unwrap()
            .get(&(operation.to_string(), resource.to_string()))
        {
            return Err(err.clone());
        }
        Ok(())
    }

    fn mutation(&self, operation: &str, resource: &str) -> ProviderResult<()> {
        self.check(operation, resource)?;
        self.mutations
            .lock()
            .unwrap()
            .push(format!("{operation} {resource}"));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fixture builders
    // ------------------------------------------------------------------

    pub fn add_group(&self, name: &str, zones: &[&str], tags: Vec<Tag>) {
        self.with(|inv| {
            inv.groups.push(AutoScalingGroup {
                name: name.to_string(),
                availability_zones: zones.iter().map(|z| z.to_string()).collect(),
                subnet_ids: zones.iter().map(|z| subnet_id(z)).collect(),
                capacity: Capacity {
                    min_size: 1,
                    max_size: 6,
                    desired_capacity: 3,
                },
                suspended_processes: vec![],
                tags,
                instances: vec![],
            })
        });
    }

    pub fn group(&self, name: &str) -> Option<AutoScalingGroup> {
        self.with(|inv| inv.groups.iter().find(|g| g.name == name).cloned())
    }

    pub fn add_alb(&self, name: &str, zones: &[&str], tags: Vec<Tag>) -> String {
        let arn = format!("arn:aws:elasticloadbalancing:us-east-1:1:loadbalancer/app/{name}/1");
        self.with(|inv| {
            inv.albs.push(LoadBalancerV2 {
                arn: arn.clone(),
                name: name.to_string(),
                lb_type: "application".to_string(),
                state: "active".to_string(),
                zones: zones
                    .iter()
                    .map(|z| ZoneMapping {
                        zone_name: z.to_string(),
                        subnet_id: subnet_id(z),
                    })
                    .collect(),
            });
            inv.alb_tags.insert(arn.clone(), tags);
        });
        arn
    }

    pub fn alb_subnets(&self, arn: &str) -> Vec<String> {
        self.with(|inv| {
            let mut subnets: Vec<String> = inv
                .albs
                .iter()
                .find(|lb| lb.arn == arn)
                .map(|lb| lb.zones.iter().map(|z| z.subnet_id.clone()).collect())
                .unwrap_or_default();
            subnets.sort();
            subnets
        })
    }

    pub fn add_classic(&self, name: &str, vpc: Option<&str>, zones: &[&str], tags: Vec<Tag>) {
        self.with(|inv| {
            inv.classic.push(ClassicLoadBalancer {
                name: name.to_string(),
                availability_zones: zones.iter().map(|z| z.to_string()).collect(),
                subnet_ids: match vpc {
                    Some(_) => zones.iter().map(|z| subnet_id(z)).collect(),
                    None => vec![],
                },
                vpc_id: vpc.map(str::to_string),
            });
            inv.classic_tags.insert(name.to_string(), tags);
        });
    }

    pub fn classic(&self, name: &str) -> Option<ClassicLoadBalancer> {
        self.with(|inv| inv.classic.iter().find(|lb| lb.name == name).cloned())
    }

    /// ACL currently associated with `subnet`
    pub fn acl_of(&self, subnet: &str) -> Option<String> {
        self.with(|inv| {
            inv.acls
                .iter()
                .find(|a| a.associations.iter().any(|s| s.subnet_id == subnet))
                .map(|a| a.network_acl_id.clone())
        })
    }

    pub fn acl_count(&self) -> usize {
        self.with(|inv| inv.acls.len())
    }

    pub fn add_instance(
        &self,
        id: &str,
        zone: &str,
        lifecycle: InstanceLifecycle,
        spot: Option<(&str, SpotRequestType)>,
        tags: Vec<Tag>,
    ) {
        self.with(|inv| {
            inv.instances.push(Instance {
                instance_id: id.to_string(),
                availability_zone: zone.to_string(),
                state: "running".to_string(),
                lifecycle,
                spot_instance_request_id: spot.map(|(r, _)| r.to_string()),
                tags,
            });
            if let Some((request_id, request_type)) = spot {
                inv.spot_requests.push(SpotRequest {
                    request_id: request_id.to_string(),
                    request_type,
                });
            }
        });
    }

    pub fn instance_state(&self, id: &str) -> Option<String> {
        self.with(|inv| {
            inv.instances
                .iter()
                .find(|i| i.instance_id == id)
                .map(|i| i.state.clone())
        })
    }

    /// Tagged cluster with one node group backed by `asg`
    pub fn add_nodegroup(&self, cluster: &str, nodegroup: &str, asg: &str, zones: &[&str]) {
        self.add_group(asg, zones, vec![]);
        self.with(|inv| {
            if !inv.clusters.iter().any(|c| c.name == cluster) {
                inv.clusters.push(EksCluster {
                    name: cluster.to_string(),
                    tags: vec![failure_tag()],
                });
            }
            inv.nodegroups.push(Nodegroup {
                cluster_name: cluster.to_string(),
                name: nodegroup.to_string(),
                subnet_ids: zones.iter().map(|z| subnet_id(z)).collect(),
                auto_scaling_groups: vec![asg.to_string()],
            });
        });
    }
}

// ----------------------------------------------------------------------
// Filter evaluation
// ----------------------------------------------------------------------

fn tag_values(tags: &[Tag], name: &str) -> Option<Vec<String>> {
    let key = name.strip_prefix("tag:")?;
    Some(
        tags.iter()
            .filter(|t| t.key == key)
            .map(|t| t.value.clone())
            .collect(),
    )
}

/// A resource passes when, for every filter, one of its values is listed
fn passes(filters: &[Filter], values_of: impl Fn(&str) -> Option<Vec<String>>) -> bool {
    filters.iter().all(|f| {
        values_of(&f.name)
            .unwrap_or_default()
            .iter()
            .any(|v| f.values.contains(v))
    })
}

fn subnet_values(s: &Subnet, name: &str) -> Option<Vec<String>> {
    match name {
        "subnet-id" => Some(vec![s.subnet_id.clone()]),
        "availability-zone" => Some(vec![s.availability_zone.clone()]),
        "vpc-id" => Some(vec![s.vpc_id.clone()]),
        other => tag_values(&s.tags, other),
    }
}

fn instance_values(i: &Instance, name: &str) -> Option<Vec<String>> {
    match name {
        "instance-id" => Some(vec![i.instance_id.clone()]),
        "availability-zone" => Some(vec![i.availability_zone.clone()]),
        "instance-state-name" => Some(vec![i.state.clone()]),
        other => tag_values(&i.tags, other),
    }
}

fn acl_values(a: &NetworkAcl, name: &str) -> Option<Vec<String>> {
    match name {
        "association.subnet-id" => Some(a.associations.iter().map(|s| s.subnet_id.clone()).collect()),
        "network-acl-id" => Some(vec![a.network_acl_id.clone()]),
        "vpc-id" => Some(vec![a.vpc_id.clone()]),
        other => tag_values(&a.tags, other),
    }
}

fn missing(code: &str, what: &str) -> ProviderError {
    ProviderError::from_code(code, format!("{what} does not exist"))
}

// ----------------------------------------------------------------------
// Provider traits
// ----------------------------------------------------------------------

#[async_trait]
impl AutoScalingApi for MockCloud {
    async fn describe_groups(&self, names: &[String]) -> ProviderResult<Vec<AutoScalingGroup>> {
        self.check("DescribeAutoScalingGroups", "")?;
        Ok(self.with(|inv| {
            inv.groups
                .iter()
                .filter(|g| names.is_empty() || names.contains(&g.name))
                .cloned()
                .collect()
        }))
    }

    async fn update_subnets(&self, group: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        self.mutation("UpdateAutoScalingGroup", group)?;
        self.with(|inv| {
            let zones = inv.zones_of(subnet_ids);
            let g = inv
                .groups
                .iter_mut()
                .find(|g| g.name == group)
                .ok_or_else(|| missing("ValidationError", group))?;
            g.subnet_ids = subnet_ids.to_vec();
            g.availability_zones = zones;
            Ok(())
        })
    }

    async fn update_capacity(&self, group: &str, capacity: Capacity) -> ProviderResult<()> {
        self.mutation("UpdateAutoScalingGroup", group)?;
        self.with(|inv| {
            let g = inv
                .groups
                .iter_mut()
                .find(|g| g.name == group)
                .ok_or_else(|| missing("ValidationError", group))?;
            g.capacity = capacity;
            Ok(())
        })
    }

    async fn suspend_processes(&self, group: &str, processes: &[String]) -> ProviderResult<()> {
        self.mutation("SuspendProcesses", group)?;
        self.with(|inv| {
            if let Some(g) = inv.groups.iter_mut().find(|g| g.name == group) {
                for p in processes {
                    if !g.suspended_processes.contains(p) {
                        g.suspended_processes.push(p.clone());
                    }
                }
            }
        });
        Ok(())
    }

    async fn resume_processes(&self, group: &str, processes: &[String]) -> ProviderResult<()> {
        self.mutation("ResumeProcesses", group)?;
        self.with(|inv| {
            if let Some(g) = inv.groups.iter_mut().find(|g| g.name == group) {
                g.suspended_processes.retain(|p| !processes.contains(p));
            }
        });
        Ok(())
    }
}

#[async_trait]
impl Ec2Api for MockCloud {
    async fn describe_availability_zones(&self) -> ProviderResult<Vec<String>> {
        self.check("DescribeAvailabilityZones", "")?;
        Ok(self.with(|inv| inv.zones.clone()))
    }

    async fn describe_subnets(&self, filters: &[Filter]) -> ProviderResult<Vec<Subnet>> {
        self.check("DescribeSubnets", "")?;
        Ok(self.with(|inv| {
            inv.subnets
                .iter()
                .filter(|s| passes(filters, |n| subnet_values(s, n)))
                .cloned()
                .collect()
        }))
    }

    async fn default_vpc_id(&self) -> ProviderResult<Option<String>> {
        self.check("DescribeVpcs", "")?;
        Ok(self.with(|inv| inv.default_vpc.clone()))
    }

    async fn describe_network_acls(&self, filters: &[Filter]) -> ProviderResult<Vec<NetworkAcl>> {
        self.check("DescribeNetworkAcls", "")?;
        Ok(self.with(|inv| {
            inv.acls
                .iter()
                .filter(|a| passes(filters, |n| acl_values(a, n)))
                .cloned()
                .collect()
        }))
    }

    async fn create_network_acl(&self, vpc_id: &str, tags: &[Tag]) -> ProviderResult<String> {
        self.mutation("CreateNetworkAcl", vpc_id)?;
        Ok(self.with(|inv| {
            let id = inv.next("acl-bh");
            inv.acls.push(NetworkAcl {
                network_acl_id: id.clone(),
                vpc_id: vpc_id.to_string(),
                is_default: false,
                tags: tags.to_vec(),
                associations: vec![],
            });
            id
        }))
    }

    async fn create_deny_all_entry(
        &self,
        network_acl_id: &str,
        rule_number: i32,
        egress: bool,
    ) -> ProviderResult<()> {
        self.mutation("CreateNetworkAclEntry", network_acl_id)?;
        self.with(|inv| {
            if !inv.acls.iter().any(|a| a.network_acl_id == network_acl_id) {
                return Err(missing("InvalidNetworkAclID.NotFound", network_acl_id));
            }
            if !inv
                .acl_entries
                .insert((network_acl_id.to_string(), rule_number, egress))
            {
                return Err(ProviderError::from_code(
                    "NetworkAclEntryAlreadyExists",
                    format!("rule {rule_number} exists"),
                ));
            }
            Ok(())
        })
    }

    async fn replace_network_acl_association(
        &self,
        association_id: &str,
        network_acl_id: &str,
    ) -> ProviderResult<String> {
        self.mutation("ReplaceNetworkAclAssociation", association_id)?;
        self.with(|inv| {
            if !inv.acls.iter().any(|a| a.network_acl_id == network_acl_id) {
                return Err(missing("InvalidNetworkAclID.NotFound", network_acl_id));
            }
            let mut moved = None;
            for acl in inv.acls.iter_mut() {
                if let Some(pos) = acl
                    .associations
                    .iter()
                    .position(|a| a.association_id == association_id)
                {
                    moved = Some(acl.associations.remove(pos));
                }
            }
            let Some(old) = moved else {
                return Err(missing("InvalidAssociationID.NotFound", association_id));
            };
            let new_id = inv.next("aclassoc");
            if let Some(acl) = inv
                .acls
                .iter_mut()
                .find(|a| a.network_acl_id == network_acl_id)
            {
                acl.associations.push(AclAssociation {
                    association_id: new_id.clone(),
                    subnet_id: old.subnet_id,
                });
            }
            Ok(new_id)
        })
    }

    async fn delete_network_acl(&self, network_acl_id: &str) -> ProviderResult<()> {
        self.mutation("DeleteNetworkAcl", network_acl_id)?;
        self.with(|inv| {
            let pos = inv
                .acls
                .iter()
                .position(|a| a.network_acl_id == network_acl_id)
                .ok_or_else(|| missing("InvalidNetworkAclID.NotFound", network_acl_id))?;
            if !inv.acls[pos].associations.is_empty() {
                return Err(ProviderError::from_code(
                    "DependencyViolation",
                    format!("{network_acl_id} has associations"),
                ));
            }
            inv.acls.remove(pos);
            inv.acl_entries.retain(|(acl, _, _)| acl != network_acl_id);
            Ok(())
        })
    }

    async fn describe_instances(&self, filters: &[Filter]) -> ProviderResult<Vec<Instance>> {
        self.check("DescribeInstances", "")?;
        Ok(self.with(|inv| {
            inv.instances
                .iter()
                .filter(|i| passes(filters, |n| instance_values(i, n)))
                .cloned()
                .collect()
        }))
    }

    async fn describe_spot_requests(
        &self,
        request_ids: &[String],
    ) -> ProviderResult<Vec<SpotRequest>> {
        self.check("DescribeSpotInstanceRequests", "")?;
        Ok(self.with(|inv| {
            inv.spot_requests
                .iter()
                .filter(|r| request_ids.contains(&r.request_id))
                .cloned()
                .collect()
        }))
    }

    async fn stop_instances(
        &self,
        instance_ids: &[String],
        _force: bool,
    ) -> ProviderResult<Vec<InstanceStateChange>> {
        self.transition("StopInstances", instance_ids, "stopped")
    }

    async fn terminate_instances(
        &self,
        instance_ids: &[String],
    ) -> ProviderResult<Vec<InstanceStateChange>> {
        self.transition("TerminateInstances", instance_ids, "terminated")
    }

    async fn cancel_spot_requests(&self, request_ids: &[String]) -> ProviderResult<()> {
        self.mutation("CancelSpotInstanceRequests", &request_ids.join(","))?;
        self.with(|inv| inv.spot_requests.retain(|r| !request_ids.contains(&r.request_id)));
        Ok(())
    }
}

impl MockCloud {
    fn transition(
        &self,
        operation: &str,
        instance_ids: &[String],
        to: &str,
    ) -> ProviderResult<Vec<InstanceStateChange>> {
        self.mutation(operation, &instance_ids.join(","))?;
        self.with(|inv| {
            let mut changes = Vec::new();
            for id in instance_ids {
                let instance = inv
                    .instances
                    .iter_mut()
                    .find(|i| &i.instance_id == id)
                    .ok_or_else(|| missing("InvalidInstanceID.NotFound", id))?;
                changes.push(InstanceStateChange {
                    instance_id: id.clone(),
                    previous_state: std::mem::replace(&mut instance.state, to.to_string()),
                    current_state: to.to_string(),
                });
            }
            Ok(changes)
        })
    }
}

#[async_trait]
impl ClassicElbApi for MockCloud {
    async fn describe_load_balancers(
        &self,
        names: &[String],
    ) -> ProviderResult<Vec<ClassicLoadBalancer>> {
        self.check("DescribeLoadBalancers", "")?;
        self.with(|inv| {
            if let Some(unknown) = names.iter().find(|n| !inv.classic.iter().any(|lb| &lb.name == *n)) {
                return Err(missing("LoadBalancerNotFound", unknown));
            }
            Ok(inv
                .classic
                .iter()
                .filter(|lb| names.is_empty() || names.contains(&lb.name))
                .cloned()
                .collect())
        })
    }

    async fn describe_tags(&self, names: &[String]) -> ProviderResult<HashMap<String, Vec<Tag>>> {
        self.check("DescribeTags", "")?;
        assert!(names.len() <= 20, "tag queries are limited to 20 balancers");
        Ok(self.with(|inv| {
            names
                .iter()
                .filter_map(|n| inv.classic_tags.get(n).map(|t| (n.clone(), t.clone())))
                .collect()
        }))
    }

    async fn detach_subnets(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        self.mutation("DetachLoadBalancerFromSubnets", name)?;
        self.with(|inv| {
            let mut subnets = Vec::new();
            if let Some(lb) = inv.classic.iter_mut().find(|lb| lb.name == name) {
                lb.subnet_ids.retain(|s| !subnet_ids.contains(s));
                subnets = lb.subnet_ids.clone();
            }
            let zones = inv.zones_of(&subnets);
            if let Some(lb) = inv.classic.iter_mut().find(|lb| lb.name == name) {
                lb.availability_zones = zones;
            }
        });
        Ok(())
    }

    async fn attach_subnets(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        self.mutation("AttachLoadBalancerToSubnets", name)?;
        self.with(|inv| {
            let mut subnets = Vec::new();
            if let Some(lb) = inv.classic.iter_mut().find(|lb| lb.name == name) {
                for s in subnet_ids {
                    if !lb.subnet_ids.contains(s) {
                        lb.subnet_ids.push(s.clone());
                    }
                }
                lb.subnet_ids.sort();
                subnets = lb.subnet_ids.clone();
            }
            let zones = inv.zones_of(&subnets);
            if let Some(lb) = inv.classic.iter_mut().find(|lb| lb.name == name) {
                lb.availability_zones = zones;
            }
        });
        Ok(())
    }

    async fn disable_availability_zones(
        &self,
        name: &str,
        zones: &[String],
    ) -> ProviderResult<()> {
        self.mutation("DisableAvailabilityZonesForLoadBalancer", name)?;
        self.with(|inv| {
            if let Some(lb) = inv.classic.iter_mut().find(|lb| lb.name == name) {
                lb.availability_zones.retain(|z| !zones.contains(z));
            }
        });
        Ok(())
    }

    async fn enable_availability_zones(&self, name: &str, zones: &[String]) -> ProviderResult<()> {
        self.mutation("EnableAvailabilityZonesForLoadBalancer", name)?;
        self.with(|inv| {
            if let Some(lb) = inv.classic.iter_mut().find(|lb| lb.name == name) {
                for z in zones {
                    if !lb.availability_zones.contains(z) {
                        lb.availability_zones.push(z.clone());
                    }
                }
                lb.availability_zones.sort();
            }
        });
        Ok(())
    }
}

#[async_trait]
impl ElbV2Api for MockCloud {
    async fn describe_load_balancers(&self, arns: &[String]) -> ProviderResult<Vec<LoadBalancerV2>> {
        self.check("DescribeLoadBalancersV2", "")?;
        Ok(self.with(|inv| {
            inv.albs
                .iter()
                .filter(|lb| arns.is_empty() || arns.contains(&lb.arn))
                .cloned()
                .collect()
        }))
    }

    async fn describe_tags(&self, arns: &[String]) -> ProviderResult<HashMap<String, Vec<Tag>>> {
        self.check("DescribeTagsV2", "")?;
        assert!(arns.len() <= 20, "tag queries are limited to 20 balancers");
        Ok(self.with(|inv| {
            arns.iter()
                .filter_map(|a| inv.alb_tags.get(a).map(|t| (a.clone(), t.clone())))
                .collect()
        }))
    }

    async fn set_subnets(&self, arn: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        self.mutation("SetSubnets", arn)?;
        self.with(|inv| {
            let zones: Vec<ZoneMapping> = subnet_ids
                .iter()
                .filter_map(|s| {
                    inv.zone_of(s).map(|zone_name| ZoneMapping {
                        zone_name,
                        subnet_id: s.clone(),
                    })
                })
                .collect();
            let lb = inv
                .albs
                .iter_mut()
                .find(|lb| lb.arn == arn)
                .ok_or_else(|| missing("LoadBalancerNotFound", arn))?;
            lb.zones = zones;
            Ok(())
        })
    }
}

#[async_trait]
impl RdsApi for MockCloud {
    async fn describe_db_instances(&self) -> ProviderResult<Vec<DbInstance>> {
        self.check("DescribeDBInstances", "")?;
        Ok(self.with(|inv| inv.db_instances.clone()))
    }

    async fn describe_db_clusters(&self) -> ProviderResult<Vec<DbCluster>> {
        self.check("DescribeDBClusters", "")?;
        Ok(self.with(|inv| inv.db_clusters.clone()))
    }

    async fn reboot_db_instance(&self, identifier: &str, _force_failover: bool) -> ProviderResult<()> {
        self.mutation("RebootDBInstance", identifier)
    }

    async fn failover_db_cluster(
        &self,
        identifier: &str,
        _target_instance: Option<&str>,
    ) -> ProviderResult<()> {
        self.mutation("FailoverDBCluster", identifier)
    }
}

#[async_trait]
impl ElastiCacheApi for MockCloud {
    async fn describe_replication_groups(
        &self,
        id: Option<&str>,
    ) -> ProviderResult<Vec<ReplicationGroup>> {
        self.check("DescribeReplicationGroups", id.unwrap_or_default())?;
        self.with(|inv| {
            let groups: Vec<ReplicationGroup> = inv
                .replication_groups
                .iter()
                .filter(|g| id.map_or(true, |id| g.id == id))
                .cloned()
                .collect();
            match id {
                Some(id) if groups.is_empty() => Err(missing("ReplicationGroupNotFoundFault", id)),
                _ => Ok(groups),
            }
        })
    }

    async fn list_tags(&self, arn: &str) -> ProviderResult<Vec<Tag>> {
        self.check("ListTagsForResource", arn)?;
        Ok(self.with(|inv| inv.cache_tags.get(arn).cloned().unwrap_or_default()))
    }

    async fn test_failover(
        &self,
        replication_group_id: &str,
        node_group_id: &str,
    ) -> ProviderResult<()> {
        self.mutation("TestFailover", &format!("{replication_group_id}/{node_group_id}"))
    }
}

#[async_trait]
impl EksApi for MockCloud {
    async fn list_clusters(&self) -> ProviderResult<Vec<String>> {
        self.check("ListClusters", "")?;
        Ok(self.with(|inv| inv.clusters.iter().map(|c| c.name.clone()).collect()))
    }

    async fn describe_cluster(&self, name: &str) -> ProviderResult<EksCluster> {
        self.check("DescribeCluster", name)?;
        self.with(|inv| {
            inv.clusters
                .iter()
                .find(|c| c.name == name)
                .cloned()
                .ok_or_else(|| missing("ResourceNotFoundException", name))
        })
    }

    async fn list_nodegroups(&self, cluster: &str) -> ProviderResult<Vec<String>> {
        self.check("ListNodegroups", cluster)?;
        Ok(self.with(|inv| {
            inv.nodegroups
                .iter()
                .filter(|ng| ng.cluster_name == cluster)
                .map(|ng| ng.name.clone())
                .collect()
        }))
    }

    async fn describe_nodegroup(&self, cluster: &str, nodegroup: &str) -> ProviderResult<Nodegroup> {
        self.check("DescribeNodegroup", nodegroup)?;
        self.with(|inv| {
            inv.nodegroups
                .iter()
                .find(|ng| ng.cluster_name == cluster && ng.name == nodegroup)
                .cloned()
                .ok_or_else(|| missing("ResourceNotFoundException", nodegroup))
        })
    }
}

#[async_trait]
impl MqApi for MockCloud {
    async fn list_broker_ids(&self) -> ProviderResult<Vec<String>> {
        self.check("ListBrokers", "")?;
        Ok(self.with(|inv| inv.brokers.iter().map(|b| b.id.clone()).collect()))
    }

    async fn describe_broker(&self, broker_id: &str) -> ProviderResult<Broker> {
        self.check("DescribeBroker", broker_id)?;
        self.with(|inv| {
            inv.brokers
                .iter()
                .find(|b| b.id == broker_id)
                .cloned()
                .ok_or_else(|| missing("NotFoundException", broker_id))
        })
    }

    async fn reboot_broker(&self, broker_id: &str) -> ProviderResult<()> {
        self.mutation("RebootBroker", broker_id)
    }
}
