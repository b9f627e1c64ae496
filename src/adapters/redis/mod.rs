use crate::config::PubSubConfig;
use backon::{ExponentialBuilder, Retryable};
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;

pub mod event_bus;

pub use event_bus::EventBus;

#[derive(Debug, Clone)]
pub struct PubSubMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
pub struct RedisClient {
    publisher: redis::aio::ConnectionManager,
    // Maps channel names to local broadcast senders
    subscriptions: Arc<DashMap<String, broadcast::Sender<PubSubMessage>>>,
    client: redis::Client,
    shutdown: watch::Receiver<bool>,
    channel_capacity: usize,
    config: PubSubConfig,
}

impl RedisClient {
    /// Connects to Redis for publishing and prepares subscriptions.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn new(
        url: &str,
        config: &PubSubConfig,
        channel_capacity: usize,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<Arc<Self>> {
        let client = redis::Client::open(url)?;
        let publisher = client.get_connection_manager().await?;
        let subscriptions = Arc::new(DashMap::new());

        Ok(Arc::new(Self { publisher, subscriptions, client, shutdown, channel_capacity, config: config.clone() }))
    }

    #[must_use]
    pub fn publisher(&self) -> redis::aio::ConnectionManager {
        self.publisher.clone()
    }

    /// Subscribes to a Redis channel.
    /// The first subscriber starts a background listener that reconnects with backoff.
    ///
    /// # Errors
    /// Returns an error if the subscription fails.
    pub async fn subscribe(&self, channel: &str) -> anyhow::Result<broadcast::Receiver<PubSubMessage>> {
        if let Some(tx) = self.subscriptions.get(channel) {
            return Ok(tx.subscribe());
        }

        let (tx, rx) = broadcast::channel(self.channel_capacity);
        self.subscriptions.insert(channel.to_string(), tx.clone());

        let channel_name = channel.to_string();
        let client = self.client.clone();
        let shutdown = self.shutdown.clone();
        let subscriptions = Arc::clone(&self.subscriptions);
        let config = self.config.clone();

        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(
            async move {
                Self::run_listener(client, channel_name, tx, shutdown, subscriptions, config, ready_tx).await;
            }
            .instrument(tracing::debug_span!("pubsub_listener", channel = %channel)),
        );

        // Wait until the listener is subscribed
        let _ = ready_rx.await;

        Ok(rx)
    }

    async fn run_listener(
        client: redis::Client,
        channel: String,
        tx: broadcast::Sender<PubSubMessage>,
        mut shutdown: watch::Receiver<bool>,
        subscriptions: Arc<DashMap<String, broadcast::Sender<PubSubMessage>>>,
        config: PubSubConfig,
        ready_tx: tokio::sync::oneshot::Sender<()>,
    ) {
        let mut ready_tx = Some(ready_tx);

        loop {
            let pubsub_result = (|| async {
                let mut pubsub = client.get_async_pubsub().await?;
                pubsub.subscribe(&channel).await?;
                Ok::<redis::aio::PubSub, redis::RedisError>(pubsub)
            })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(config.min_backoff_secs))
                    .with_max_delay(Duration::from_secs(config.max_backoff_secs))
                    .without_max_times(),
            )
            .when(|_| !*shutdown.borrow())
            .notify(|e, duration| {
                tracing::warn!(error = %e, retry_in = ?duration, "Pubsub subscription failed, retrying");
            })
            .await;

            let pubsub = match pubsub_result {
                Ok(ps) => ps,
                Err(e) => {
                    tracing::error!(error = %e, "Pubsub subscription abandoned");
                    break;
                }
            };

            tracing::info!(channel = %channel, "Subscribed to pubsub channel");
            if let Some(rtx) = ready_tx.take() {
                let _ = rtx.send(());
            }

            let mut message_stream = pubsub.into_on_message();

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        subscriptions.remove(&channel);
                        return;
                    }
                    msg = message_stream.next() => {
                        if let Some(msg) = msg {
                            let pubsub_msg = PubSubMessage {
                                channel: msg.get_channel_name().to_string(),
                                payload: msg.get_payload().unwrap_or_default(),
                            };
                            // No local receivers is not an error
                            let _ = tx.send(pubsub_msg);
                        } else {
                            tracing::warn!(channel = %channel, "Pubsub connection lost, reconnecting");
                            break;
                        }
                    }
                }
            }

            if *shutdown.borrow() {
                break;
            }
        }

        subscriptions.remove(&channel);
    }

    /// Pings the Redis server to check connectivity.
    ///
    /// # Errors
    /// Returns an error if the ping fails.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.publisher();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
