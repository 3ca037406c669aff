use async_trait::async_trait;
use aws_sdk_ec2::types::{
    self, InstanceLifecycleType, ResourceType, RuleAction, SpotInstanceType, TagSpecification,
};

use super::convert::{flag, text};
use super::error::classify;
use super::AwsCloud;
use crate::backend::{
    AclAssociation, Ec2Api, Filter, Instance, InstanceLifecycle, InstanceStateChange, NetworkAcl,
    ProviderResult, SpotRequest, SpotRequestType, Subnet, Tag,
};

fn sdk_filters(filters: &[Filter]) -> Option<Vec<types::Filter>> {
    (!filters.is_empty()).then(|| {
        filters
            .iter()
            .map(|f| {
                types::Filter::builder()
                    .name(&f.name)
                    .set_values(Some(f.values.clone()))
                    .build()
            })
            .collect()
    })
}

fn tags(tags: &[types::Tag]) -> Vec<Tag> {
    tags.iter()
        .map(|t| Tag::new(text(t.key()), text(t.value())))
        .collect()
}

fn instance_state(state: Option<&types::InstanceState>) -> String {
    state
        .and_then(|s| s.name())
        .map(|n| n.as_str().to_string())
        .unwrap_or_default()
}

fn instance(i: &types::Instance) -> Instance {
    Instance {
        instance_id: text(i.instance_id()),
        availability_zone: text(i.placement().and_then(|p| p.availability_zone())),
        state: instance_state(i.state()),
        lifecycle: match i.instance_lifecycle() {
            Some(InstanceLifecycleType::Spot) => InstanceLifecycle::Spot,
            Some(InstanceLifecycleType::Scheduled) => InstanceLifecycle::Scheduled,
            _ => InstanceLifecycle::Normal,
        },
        spot_instance_request_id: i.spot_instance_request_id().map(str::to_string),
        tags: tags(i.tags()),
    }
}

fn state_change(c: &types::InstanceStateChange) -> InstanceStateChange {
    InstanceStateChange {
        instance_id: text(c.instance_id()),
        previous_state: instance_state(c.previous_state()),
        current_state: instance_state(c.current_state()),
    }
}

#[async_trait]
impl Ec2Api for AwsCloud {
    async fn describe_availability_zones(&self) -> ProviderResult<Vec<String>> {
        let output = self
            .ec2
            .describe_availability_zones()
            .filters(
                types::Filter::builder()
                    .name("state")
                    .values("available")
                    .build(),
            )
            .send()
            .await
            .map_err(classify)?;
        Ok(output
            .availability_zones()
            .iter()
            .filter_map(|z| z.zone_name().map(str::to_string))
            .collect())
    }

    async fn describe_subnets(&self, filters: &[Filter]) -> ProviderResult<Vec<Subnet>> {
        let mut subnets = Vec::new();
        let mut token = None;
        loop {
            let page = self
                .ec2
                .describe_subnets()
                .set_filters(sdk_filters(filters))
                .set_next_token(token.take())
                .send()
                .await
                .map_err(classify)?;
            subnets.extend(page.subnets().iter().map(|s| Subnet {
                subnet_id: text(s.subnet_id()),
                vpc_id: text(s.vpc_id()),
                availability_zone: text(s.availability_zone()),
                tags: tags(s.tags()),
            }));
            match page.next_token() {
                Some(next) if !next.is_empty() => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(subnets)
    }

    async fn default_vpc_id(&self) -> ProviderResult<Option<String>> {
        let output = self
            .ec2
            .describe_vpcs()
            .filters(
                types::Filter::builder()
                    .name("isDefault")
                    .values("true")
                    .build(),
            )
            .send()
            .await
            .map_err(classify)?;
        Ok(output
            .vpcs()
            .iter()
            .find_map(|v| v.vpc_id().map(str::to_string)))
    }

    async fn describe_network_acls(&self, filters: &[Filter]) -> ProviderResult<Vec<NetworkAcl>> {
        let mut acls = Vec::new();
        let mut token = None;
        loop {
            let page = self
                .ec2
                .describe_network_acls()
                .set_filters(sdk_filters(filters))
                .set_next_token(token.take())
                .send()
                .await
                .map_err(classify)?;
            acls.extend(page.network_acls().iter().map(|a| NetworkAcl {
                network_acl_id: text(a.network_acl_id()),
                vpc_id: text(a.vpc_id()),
                is_default: flag(a.is_default()),
                tags: tags(a.tags()),
                associations: a
                    .associations()
                    .iter()
                    .map(|assoc| AclAssociation {
                        association_id: text(assoc.network_acl_association_id()),
                        subnet_id: text(assoc.subnet_id()),
                    })
                    .collect(),
            }));
            match page.next_token() {
                Some(next) if !next.is_empty() => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(acls)
    }

    async fn create_network_acl(&self, vpc_id: &str, acl_tags: &[Tag]) -> ProviderResult<String> {
        let spec = TagSpecification::builder()
            .resource_type(ResourceType::NetworkAcl)
            .set_tags(Some(
                acl_tags
                    .iter()
                    .map(|t| types::Tag::builder().key(&t.key).value(&t.value).build())
                    .collect(),
            ))
            .build();
        let output = self
            .ec2
            .create_network_acl()
            .vpc_id(vpc_id)
            .tag_specifications(spec)
            .send()
            .await
            .map_err(classify)?;
        Ok(text(
            output.network_acl().and_then(|acl| acl.network_acl_id()),
        ))
    }

    async fn create_deny_all_entry(
        &self,
        network_acl_id: &str,
        rule_number: i32,
        egress: bool,
    ) -> ProviderResult<()> {
        self.ec2
            .create_network_acl_entry()
            .network_acl_id(network_acl_id)
            .rule_number(rule_number)
            .protocol("-1")
            .rule_action(RuleAction::Deny)
            .egress(egress)
            .cidr_block("0.0.0.0/0")
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn replace_network_acl_association(
        &self,
        association_id: &str,
        network_acl_id: &str,
    ) -> ProviderResult<String> {
        let output = self
            .ec2
            .replace_network_acl_association()
            .association_id(association_id)
            .network_acl_id(network_acl_id)
            .send()
            .await
            .map_err(classify)?;
        Ok(text(output.new_association_id()))
    }

    async fn delete_network_acl(&self, network_acl_id: &str) -> ProviderResult<()> {
        self.ec2
            .delete_network_acl()
            .network_acl_id(network_acl_id)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn describe_instances(&self, filters: &[Filter]) -> ProviderResult<Vec<Instance>> {
        let mut instances = Vec::new();
        let mut token = None;
        loop {
            let page = self
                .ec2
                .describe_instances()
                .set_filters(sdk_filters(filters))
                .set_next_token(token.take())
                .send()
                .await
                .map_err(classify)?;
            instances.extend(
                page.reservations()
                    .iter()
                    .flat_map(|r| r.instances())
                    .map(instance),
            );
            match page.next_token() {
                Some(next) if !next.is_empty() => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(instances)
    }

    async fn describe_spot_requests(
        &self,
        request_ids: &[String],
    ) -> ProviderResult<Vec<SpotRequest>> {
        let output = self
            .ec2
            .describe_spot_instance_requests()
            .set_spot_instance_request_ids(Some(request_ids.to_vec()))
            .send()
            .await
            .map_err(classify)?;
        Ok(output
            .spot_instance_requests()
            .iter()
            .filter_map(|r| {
                let request_type = match r.r#type()? {
                    SpotInstanceType::OneTime => SpotRequestType::OneTime,
                    SpotInstanceType::Persistent => SpotRequestType::Persistent,
                    _ => return None,
                };
                Some(SpotRequest {
                    request_id: text(r.spot_instance_request_id()),
                    request_type,
                })
            })
            .collect())
    }

    async fn stop_instances(
        &self,
        instance_ids: &[String],
        force: bool,
    ) -> ProviderResult<Vec<InstanceStateChange>> {
        let output = self
            .ec2
            .stop_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .force(force)
            .send()
            .await
            .map_err(classify)?;
        Ok(output.stopping_instances().iter().map(state_change).collect())
    }

    async fn terminate_instances(
        &self,
        instance_ids: &[String],
    ) -> ProviderResult<Vec<InstanceStateChange>> {
        let output = self
            .ec2
            .terminate_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .map_err(classify)?;
        Ok(output
            .terminating_instances()
            .iter()
            .map(state_change)
            .collect())
    }

    async fn cancel_spot_requests(&self, request_ids: &[String]) -> ProviderResult<()> {
        self.ec2
            .cancel_spot_instance_requests()
            .set_spot_instance_request_ids(Some(request_ids.to_vec()))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }
}
