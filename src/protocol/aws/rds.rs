use async_trait::async_trait;
use aws_sdk_rds::types;

use super::convert::{flag, text};
use super::error::classify;
use super::AwsCloud;
use crate::backend::{DbCluster, DbClusterMember, DbInstance, ProviderResult, RdsApi, Tag};

fn tags(list: &[types::Tag]) -> Vec<Tag> {
    list.iter()
        .map(|t| Tag::new(text(t.key()), text(t.value())))
        .collect()
}

#[async_trait]
impl RdsApi for AwsCloud {
    async fn describe_db_instances(&self) -> ProviderResult<Vec<DbInstance>> {
        let mut instances = Vec::new();
        let mut marker = None;
        loop {
            let page = self
                .rds
                .describe_db_instances()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(classify)?;
            instances.extend(page.db_instances().iter().map(|db| DbInstance {
                identifier: text(db.db_instance_identifier()),
                availability_zone: db.availability_zone().map(str::to_string),
                multi_az: flag(db.multi_az()),
                cluster_identifier: db.db_cluster_identifier().map(str::to_string),
                status: text(db.db_instance_status()),
                tags: tags(db.tag_list()),
            }));
            match page.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(instances)
    }

    async fn describe_db_clusters(&self) -> ProviderResult<Vec<DbCluster>> {
        let mut clusters = Vec::new();
        let mut marker = None;
        loop {
            let page = self
                .rds
                .describe_db_clusters()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(classify)?;
            clusters.extend(page.db_clusters().iter().map(|c| DbCluster {
                identifier: text(c.db_cluster_identifier()),
                multi_az: flag(c.multi_az()),
                members: c
                    .db_cluster_members()
                    .iter()
                    .map(|m| DbClusterMember {
                        instance_identifier: text(m.db_instance_identifier()),
                        is_writer: flag(m.is_cluster_writer()),
                    })
                    .collect(),
                tags: tags(c.tag_list()),
            }));
            match page.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(clusters)
    }

    async fn reboot_db_instance(&self, identifier: &str, force_failover: bool) -> ProviderResult<()> {
        self.rds
            .reboot_db_instance()
            .db_instance_identifier(identifier)
            .force_failover(force_failover)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn failover_db_cluster(
        &self,
        identifier: &str,
        target_instance: Option<&str>,
    ) -> ProviderResult<()> {
        self.rds
            .failover_db_cluster()
            .db_cluster_identifier(identifier)
            .set_target_db_instance_identifier(target_instance.map(str::to_string))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }
}
