use async_trait::async_trait;

use super::convert::text;
use super::error::classify;
use super::AwsCloud;
use crate::core::filter::tags_from_map;
use crate::backend::{Broker, MqApi, ProviderResult};

#[async_trait]
impl MqApi for AwsCloud {
    async fn list_broker_ids(&self) -> ProviderResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut token = None;
        loop {
            let page = self
                .mq
                .list_brokers()
                .set_next_token(token.take())
                .send()
                .await
                .map_err(classify)?;
            ids.extend(
                page.broker_summaries()
                    .iter()
                    .filter_map(|b| b.broker_id().map(str::to_string)),
            );
            match page.next_token() {
                Some(next) if !next.is_empty() => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(ids)
    }

    async fn describe_broker(&self, broker_id: &str) -> ProviderResult<Broker> {
        let output = self
            .mq
            .describe_broker()
            .broker_id(broker_id)
            .send()
            .await
            .map_err(classify)?;
        Ok(Broker {
            id: text(output.broker_id()),
            name: text(output.broker_name()),
            engine_type: output
                .engine_type()
                .map(|e| e.as_str().to_string())
                .unwrap_or_default(),
            deployment_mode: output
                .deployment_mode()
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            subnet_ids: output.subnet_ids().to_vec(),
            tags: tags_from_map(output.tags().cloned().unwrap_or_default()),
        })
    }

    async fn reboot_broker(&self, broker_id: &str) -> ProviderResult<()> {
        self.mq
            .reboot_broker()
            .broker_id(broker_id)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }
}
