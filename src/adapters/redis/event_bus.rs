use crate::adapters::redis::{PubSubMessage, RedisClient};
use crate::domain::notification::EventEnvelope;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Carries event envelopes between nodes over a single Redis channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    redis: Arc<RedisClient>,
    channel: String,
}

impl EventBus {
    #[must_use]
    pub const fn new(redis: Arc<RedisClient>, channel: String) -> Self {
        Self { redis, channel }
    }

    /// Publishes an envelope to every node, this one included.
    ///
    /// # Errors
    /// Returns an error if serialization or the Redis operation fails.
    pub async fn publish(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(envelope)?;
        let mut conn = self.redis.publisher();
        conn.publish::<_, _, i64>(&self.channel, payload).await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the subscription fails.
    pub async fn subscribe(&self) -> anyhow::Result<broadcast::Receiver<PubSubMessage>> {
        self.redis.subscribe(&self.channel).await
    }

    /// Decodes a received payload. Malformed payloads are logged and skipped.
    #[must_use]
    pub fn decode(message: &PubSubMessage) -> Option<EventEnvelope> {
        match serde_json::from_slice(&message.payload) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                tracing::warn!(error = %e, channel = %message.channel, "Dropping malformed event envelope");
                None
            }
        }
    }

    /// # Errors
    /// Returns an error if the ping fails.
    pub async fn ping(&self) -> anyhow::Result<()> {
        self.redis.ping().await
    }
}
