/// Executor for `webhook` nodes: round-trips the call through the relay
use crate::relay::{channel::RelayChannel, protocol::WebhookRegistration};
use crate::runtime::executor::{Invocation, NodeExecutor};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

#[derive(Clone)]
pub struct RelayExecutor {
    channel: RelayChannel,
}

impl RelayExecutor {
    pub fn new(channel: RelayChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl NodeExecutor for RelayExecutor {
    async fn execute(&self, invocation: Invocation) -> Result<Value> {
        let registration = WebhookRegistration::from_node_data(&invocation.node_id, &invocation.data);
        let output = self
            .channel
            .execute(registration)
            .await
            .map_err(|e| anyhow::anyhow!("Webhook node '{}' failed: {}", invocation.node_id, e))?;
        Ok(output)
    }
}
