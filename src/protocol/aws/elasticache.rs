use async_trait::async_trait;
use aws_sdk_elasticache::types::{self, AutomaticFailoverStatus};

use super::convert::{flag, text};
use super::error::classify;
use super::AwsCloud;
use crate::backend::{
    CacheNodeGroup, ElastiCacheApi, NodeGroupMember, ProviderResult, ReplicationGroup, Tag,
};

fn replication_group(g: &types::ReplicationGroup) -> ReplicationGroup {
    ReplicationGroup {
        id: text(g.replication_group_id()),
        arn: text(g.arn()),
        status: text(g.status()),
        cluster_enabled: flag(g.cluster_enabled()),
        automatic_failover: matches!(g.automatic_failover(), Some(AutomaticFailoverStatus::Enabled)),
        node_groups: g
            .node_groups()
            .iter()
            .map(|ng| CacheNodeGroup {
                node_group_id: text(ng.node_group_id()),
                members: ng
                    .node_group_members()
                    .iter()
                    .map(|m| NodeGroupMember {
                        cache_cluster_id: text(m.cache_cluster_id()),
                        preferred_availability_zone: m
                            .preferred_availability_zone()
                            .map(str::to_string),
                        current_role: m.current_role().map(str::to_string),
                    })
                    .collect(),
            })
            .collect(),
    }
}

#[async_trait]
impl ElastiCacheApi for AwsCloud {
    async fn describe_replication_groups(
        &self,
        id: Option<&str>,
    ) -> ProviderResult<Vec<ReplicationGroup>> {
        let mut groups = Vec::new();
        let mut marker = None;
        loop {
            let page = self
                .elasticache
                .describe_replication_groups()
                .set_replication_group_id(id.map(str::to_string))
                .set_marker(marker.take())
                .send()
                .await
                .map_err(classify)?;
            groups.extend(page.replication_groups().iter().map(replication_group));
            match page.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(groups)
    }

    async fn list_tags(&self, arn: &str) -> ProviderResult<Vec<Tag>> {
        let output = self
            .elasticache
            .list_tags_for_resource()
            .resource_name(arn)
            .send()
            .await
            .map_err(classify)?;
        Ok(output
            .tag_list()
            .iter()
            .map(|t| Tag::new(text(t.key()), text(t.value())))
            .collect())
    }

    async fn test_failover(
        &self,
        replication_group_id: &str,
        node_group_id: &str,
    ) -> ProviderResult<()> {
        self.elasticache
            .test_failover()
            .replication_group_id(replication_group_id)
            .node_group_id(node_group_id)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }
}
