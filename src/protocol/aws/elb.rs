use async_trait::async_trait;
use std::collections::HashMap;

use super::convert::text;
use super::error::classify;
use super::AwsCloud;
use crate::core::filter::TAG_QUERY_CHUNK;
use crate::backend::{ClassicElbApi, ClassicLoadBalancer, ProviderResult, Tag};

#[async_trait]
impl ClassicElbApi for AwsCloud {
    async fn describe_load_balancers(
        &self,
        names: &[String],
    ) -> ProviderResult<Vec<ClassicLoadBalancer>> {
        let names = (!names.is_empty()).then(|| names.to_vec());
        let mut balancers = Vec::new();
        let mut marker = None;
        loop {
            let page = self
                .elb
                .describe_load_balancers()
                .set_load_balancer_names(names.clone())
                .set_marker(marker.take())
                .send()
                .await
                .map_err(classify)?;
            balancers.extend(page.load_balancer_descriptions().iter().map(|lb| {
                ClassicLoadBalancer {
                    name: text(lb.load_balancer_name()),
                    availability_zones: lb.availability_zones().to_vec(),
                    subnet_ids: lb.subnets().to_vec(),
                    vpc_id: lb.vpc_id().map(str::to_string),
                }
            }));
            match page.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(balancers)
    }

    async fn describe_tags(&self, names: &[String]) -> ProviderResult<HashMap<String, Vec<Tag>>> {
        let mut tags = HashMap::new();
        for chunk in names.chunks(TAG_QUERY_CHUNK) {
            let output = self
                .elb
                .describe_tags()
                .set_load_balancer_names(Some(chunk.to_vec()))
                .send()
                .await
                .map_err(classify)?;
            for description in output.tag_descriptions() {
                tags.insert(
                    text(description.load_balancer_name()),
                    description
                        .tags()
                        .iter()
                        .map(|t| Tag::new(text(t.key()), text(t.value())))
                        .collect(),
                );
            }
        }
        Ok(tags)
    }

    async fn detach_subnets(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        self.elb
            .detach_load_balancer_from_subnets()
            .load_balancer_name(name)
            .set_subnets(Some(subnet_ids.to_vec()))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn attach_subnets(&self, name: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        self.elb
            .attach_load_balancer_to_subnets()
            .load_balancer_name(name)
            .set_subnets(Some(subnet_ids.to_vec()))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn disable_availability_zones(
        &self,
        name: &str,
        zones: &[String],
    ) -> ProviderResult<()> {
        self.elb
            .disable_availability_zones_for_load_balancer()
            .load_balancer_name(name)
            .set_availability_zones(Some(zones.to_vec()))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn enable_availability_zones(&self, name: &str, zones: &[String]) -> ProviderResult<()> {
        self.elb
            .enable_availability_zones_for_load_balancer()
            .load_balancer_name(name)
            .set_availability_zones(Some(zones.to_vec()))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }
}
