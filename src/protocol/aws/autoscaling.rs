use async_trait::async_trait;
use aws_sdk_autoscaling::types;

use super::convert::{number, split_subnets, text};
use super::error::classify;
use super::AwsCloud;
use crate::backend::{
    AsgInstance, AutoScalingApi, AutoScalingGroup, Capacity, ProviderResult, Tag,
};

fn group(g: &types::AutoScalingGroup) -> AutoScalingGroup {
    AutoScalingGroup {
        name: text(g.auto_scaling_group_name()),
        availability_zones: g.availability_zones().to_vec(),
        subnet_ids: split_subnets(g.vpc_zone_identifier()),
        capacity: Capacity {
            min_size: number(g.min_size()),
            max_size: number(g.max_size()),
            desired_capacity: number(g.desired_capacity()),
        },
        suspended_processes: g
            .suspended_processes()
            .iter()
            .map(|p| text(p.process_name()))
            .collect(),
        tags: g
            .tags()
            .iter()
            .map(|t| Tag::new(text(t.key()), text(t.value())))
            .collect(),
        instances: g
            .instances()
            .iter()
            .map(|i| AsgInstance {
                instance_id: text(i.instance_id()),
                availability_zone: text(i.availability_zone()),
                lifecycle_state: i
                    .lifecycle_state()
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default(),
            })
            .collect(),
    }
}

#[async_trait]
impl AutoScalingApi for AwsCloud {
    async fn describe_groups(&self, names: &[String]) -> ProviderResult<Vec<AutoScalingGroup>> {
        let names = (!names.is_empty()).then(|| names.to_vec());
        let mut groups = Vec::new();
        let mut token = None;
        loop {
            let page = self
                .autoscaling
                .describe_auto_scaling_groups()
                .set_auto_scaling_group_names(names.clone())
                .set_next_token(token.take())
                .send()
                .await
                .map_err(classify)?;
            groups.extend(page.auto_scaling_groups().iter().map(group));
            match page.next_token() {
                Some(next) if !next.is_empty() => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(groups)
    }

    async fn update_subnets(&self, group: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        self.autoscaling
            .update_auto_scaling_group()
            .auto_scaling_group_name(group)
            .vpc_zone_identifier(subnet_ids.join(","))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn update_capacity(&self, group: &str, capacity: Capacity) -> ProviderResult<()> {
        self.autoscaling
            .update_auto_scaling_group()
            .auto_scaling_group_name(group)
            .min_size(capacity.min_size)
            .max_size(capacity.max_size)
            .desired_capacity(capacity.desired_capacity)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn suspend_processes(&self, group: &str, processes: &[String]) -> ProviderResult<()> {
        self.autoscaling
            .suspend_processes()
            .auto_scaling_group_name(group)
            .set_scaling_processes(Some(processes.to_vec()))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn resume_processes(&self, group: &str, processes: &[String]) -> ProviderResult<()> {
        self.autoscaling
            .resume_processes()
            .auto_scaling_group_name(group)
            .set_scaling_processes(Some(processes.to_vec()))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }
}
