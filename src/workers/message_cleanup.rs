use crate::adapters::database::DbPool;
use crate::adapters::database::message_repo::MessageRepository;
use crate::config::MessagingConfig;
use crate::error::Result;
use opentelemetry::{global, metrics::Counter};
use std::time::Duration;
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    expired_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("ephemera-server");
        Self {
            expired_total: meter
                .u64_counter("ephemera_messages_expired_total")
                .with_description("Total messages purged after their TTL")
                .build(),
        }
    }
}

/// Purges messages past `expires_at`. Their receipts go with them through the cascade.
#[derive(Debug)]
pub struct MessageCleanupWorker {
    pool: DbPool,
    repo: MessageRepository,
    config: MessagingConfig,
    metrics: Metrics,
}

impl MessageCleanupWorker {
    #[must_use]
    pub fn new(pool: DbPool, repo: MessageRepository, config: MessagingConfig) -> Self {
        Self { pool, repo, config, metrics: Metrics::new() }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.cleanup_interval_secs));

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.perform_cleanup()
                        .instrument(tracing::info_span!("message_cleanup_iteration"))
                        .await
                    {
                        tracing::error!(error = ?e, "Message cleanup iteration failed");
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Message cleanup loop shutting down...");
    }

    /// # Errors
    /// Returns an error if the database connection or query fails.
    #[tracing::instrument(skip(self), err, fields(expired_deleted = tracing::field::Empty))]
    pub async fn perform_cleanup(&self) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        let count = self.repo.delete_expired(&mut conn).await?;

        if count > 0 {
            tracing::info!(count = %count, "Deleted expired messages");
            self.metrics.expired_total.add(count, &[]);
            tracing::Span::current().record("expired_deleted", count);
        }
        Ok(count)
    }
}
