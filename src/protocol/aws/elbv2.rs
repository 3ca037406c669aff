use async_trait::async_trait;
use std::collections::HashMap;

use super::convert::text;
use super::error::classify;
use super::AwsCloud;
use crate::core::filter::TAG_QUERY_CHUNK;
use crate::backend::{ElbV2Api, LoadBalancerV2, ProviderResult, Tag, ZoneMapping};

#[async_trait]
impl ElbV2Api for AwsCloud {
    async fn describe_load_balancers(&self, arns: &[String]) -> ProviderResult<Vec<LoadBalancerV2>> {
        let arns = (!arns.is_empty()).then(|| arns.to_vec());
        let mut balancers = Vec::new();
        let mut marker = None;
        loop {
            let page = self
                .elbv2
                .describe_load_balancers()
                .set_load_balancer_arns(arns.clone())
                .set_marker(marker.take())
                .send()
                .await
                .map_err(classify)?;
            balancers.extend(page.load_balancers().iter().map(|lb| LoadBalancerV2 {
                arn: text(lb.load_balancer_arn()),
                name: text(lb.load_balancer_name()),
                lb_type: lb
                    .r#type()
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_default(),
                state: lb
                    .state()
                    .and_then(|s| s.code())
                    .map(|c| c.as_str().to_string())
                    .unwrap_or_default(),
                zones: lb
                    .availability_zones()
                    .iter()
                    .map(|z| ZoneMapping {
                        zone_name: text(z.zone_name()),
                        subnet_id: text(z.subnet_id()),
                    })
                    .collect(),
            }));
            match page.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(balancers)
    }

    async fn describe_tags(&self, arns: &[String]) -> ProviderResult<HashMap<String, Vec<Tag>>> {
        let mut tags = HashMap::new();
        for chunk in arns.chunks(TAG_QUERY_CHUNK) {
            let output = self
                .elbv2
                .describe_tags()
                .set_resource_arns(Some(chunk.to_vec()))
                .send()
                .await
                .map_err(classify)?;
            for description in output.tag_descriptions() {
                tags.insert(
                    text(description.resource_arn()),
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

    async fn set_subnets(&self, arn: &str, subnet_ids: &[String]) -> ProviderResult<()> {
        self.elbv2
            .set_subnets()
            .load_balancer_arn(arn)
            .set_subnets(Some(subnet_ids.to_vec()))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }
}
