use crate::adapters::database::DbPool;
use crate::adapters::redis::EventBus;
use crate::config::HealthConfig;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
struct Metrics {
    status: Gauge<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("ephemera-server");
        Self {
            status: meter
                .i64_gauge("ephemera_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    pool: DbPool,
    bus: Option<EventBus>,
    config: HealthConfig,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(pool: DbPool, bus: Option<EventBus>, config: HealthConfig) -> Self {
        Self { pool, bus, config, metrics: Metrics::new() }
    }

    /// Checks database connectivity.
    ///
    /// # Errors
    /// Returns a string describing the failure if the database is unreachable.
    pub async fn check_db(&self) -> Result<(), String> {
        let db_timeout = Duration::from_millis(self.config.db_timeout_ms);

        let result = match timeout(db_timeout, sqlx::query("SELECT 1").execute(&self.pool)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(format!("Database connection failed: {e:?}")),
            Err(_) => Err("Database connection timed out".to_string()),
        };
        self.record("database", result.is_ok());
        result
    }

    /// Checks `PubSub` connectivity. Always healthy when running without a bus.
    ///
    /// # Errors
    /// Returns a string describing the failure if `PubSub` is unreachable.
    pub async fn check_pubsub(&self) -> Result<(), String> {
        let Some(bus) = &self.bus else {
            return Ok(());
        };
        let pubsub_timeout = Duration::from_millis(self.config.pubsub_timeout_ms);

        let result = match timeout(pubsub_timeout, bus.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("PubSub connection failed: {e:?}")),
            Err(_) => Err("PubSub connection timed out".to_string()),
        };
        self.record("pubsub", result.is_ok());
        result
    }

    fn record(&self, component: &'static str, ok: bool) {
        self.metrics.status.record(i64::from(ok), &[KeyValue::new("component", component)]);
    }
}
