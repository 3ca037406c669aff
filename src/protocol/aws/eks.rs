use async_trait::async_trait;

use super::convert::text;
use super::error::classify;
use super::AwsCloud;
use crate::core::filter::tags_from_map;
use crate::backend::{EksApi, EksCluster, Nodegroup, ProviderError, ProviderResult};

#[async_trait]
impl EksApi for AwsCloud {
    async fn list_clusters(&self) -> ProviderResult<Vec<String>> {
        let mut names = Vec::new();
        let mut token = None;
        loop {
            let page = self
                .eks
                .list_clusters()
                .set_next_token(token.take())
                .send()
                .await
                .map_err(classify)?;
            names.extend(page.clusters().iter().cloned());
            match page.next_token() {
                Some(next) if !next.is_empty() => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(names)
    }

    async fn describe_cluster(&self, name: &str) -> ProviderResult<EksCluster> {
        let output = self
            .eks
            .describe_cluster()
            .name(name)
            .send()
            .await
            .map_err(classify)?;
        let cluster = output
            .cluster()
            .ok_or_else(|| ProviderError::not_found(format!("cluster {name}")))?;
        Ok(EksCluster {
            name: text(cluster.name()),
            tags: tags_from_map(cluster.tags().cloned().unwrap_or_default()),
        })
    }

    async fn list_nodegroups(&self, cluster: &str) -> ProviderResult<Vec<String>> {
        let mut names = Vec::new();
        let mut token = None;
        loop {
            let page = self
                .eks
                .list_nodegroups()
                .cluster_name(cluster)
                .set_next_token(token.take())
                .send()
                .await
                .map_err(classify)?;
            names.extend(page.nodegroups().iter().cloned());
            match page.next_token() {
                Some(next) if !next.is_empty() => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(names)
    }

    async fn describe_nodegroup(&self, cluster: &str, nodegroup: &str) -> ProviderResult<Nodegroup> {
        let output = self
            .eks
            .describe_nodegroup()
            .cluster_name(cluster)
            .nodegroup_name(nodegroup)
            .send()
            .await
            .map_err(classify)?;
        let ng = output
            .nodegroup()
            .ok_or_else(|| ProviderError::not_found(format!("nodegroup {cluster}/{nodegroup}")))?;
        Ok(Nodegroup {
            cluster_name: cluster.to_string(),
            name: text(ng.nodegroup_name()),
            subnet_ids: ng.subnets().to_vec(),
            auto_scaling_groups: ng
                .resources()
                .map(|r| {
                    r.auto_scaling_groups()
                        .iter()
                        .filter_map(|g| g.name().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}
