#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::adapters::database::DbPool;
use crate::adapters::database::message_repo::MessageRepository;
use crate::adapters::database::receipt_repo::ReceiptRepository;
use crate::adapters::database::room_repo::RoomRepository;
use crate::adapters::database::session_repo::SessionRepository;
use crate::adapters::database::user_repo::UserRepository;
use crate::adapters::redis::{EventBus, RedisClient};
use crate::api::ServiceContainer;
use crate::config::Config;
use crate::services::gateway::GatewayService;
use crate::services::health_service::HealthService;
use crate::services::message_service::MessageService;
use crate::services::notification_service::NotificationService;
use crate::services::presence_service::PresenceService;
use crate::services::receipt_service::ReceiptService;
use crate::services::room_service::RoomService;
use crate::services::session_service::SessionService;
use crate::services::user_service::UserService;
use crate::workers::{MessageCleanupWorker, NotificationWorker, PresenceSweepWorker};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Applies pending schema migrations.
///
/// # Errors
/// Returns an error if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await?;
    Ok(())
}

/// Connects the cross-node event bus when a pub/sub URL is configured.
///
/// # Errors
/// Returns an error if Redis is configured but unreachable.
pub async fn connect_event_bus(
    config: &Config,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<Option<EventBus>> {
    let Some(url) = &config.pubsub.url else {
        tracing::info!("No pub/sub URL configured, events stay node-local");
        return Ok(None);
    };

    let redis = RedisClient::new(url, &config.pubsub, config.notifications.channel_capacity, shutdown_rx).await?;
    Ok(Some(EventBus::new(redis, config.pubsub.channel.clone())))
}

/// Flips the shutdown channel on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
            () = terminate => tracing::info!("Received SIGTERM, shutting down"),
        }

        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through tracing so they reach the structured log.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(ToString::to_string).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();

        tracing::error!(panic.location = %location, panic.payload = %payload, "Thread panicked");
    }));
}

#[derive(Debug)]
pub struct Workers {
    message_cleanup: MessageCleanupWorker,
    notification: NotificationWorker,
    presence_sweep: PresenceSweepWorker,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.message_cleanup.run(shutdown_rx.clone())),
            tokio::spawn(self.notification.run(shutdown_rx.clone())),
            tokio::spawn(self.presence_sweep.run(shutdown_rx)),
        ]
    }
}

#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
    pub workers: Workers,
}

/// Wires repositories, services and workers together. Performs no I/O.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    pool: Option<DbPool>,
    bus: Option<EventBus>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, pool: None, bus: None }
    }

    #[must_use]
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn with_event_bus(mut self, bus: Option<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    /// # Errors
    /// Returns an error if no database pool was supplied.
    pub fn build(self) -> anyhow::Result<App> {
        let Self { config, pool, bus } = self;
        let pool = pool.ok_or_else(|| anyhow::anyhow!("AppBuilder requires a database pool"))?;

        let message_repo = MessageRepository::new();
        let receipt_repo = ReceiptRepository::new();
        let room_repo = RoomRepository::new();
        let session_repo = SessionRepository::new();
        let user_repo = UserRepository::new();

        let notifier = NotificationService::new(bus.clone(), &config.notifications);
        let presence_service = PresenceService::new(notifier.clone(), &config.presence);

        let room_service = RoomService::new(pool.clone(), room_repo.clone(), user_repo.clone(), notifier.clone());
        let message_service = MessageService::new(
            pool.clone(),
            message_repo.clone(),
            receipt_repo.clone(),
            room_repo.clone(),
            room_service.clone(),
            notifier.clone(),
            config.messaging.clone(),
        );
        let receipt_service = ReceiptService::new(
            pool.clone(),
            receipt_repo,
            message_repo.clone(),
            room_repo,
            message_service.clone(),
            notifier.clone(),
        );
        let session_service = SessionService::new(pool.clone(), session_repo, notifier.clone(), config.auth.clone());
        let user_service = UserService::new(pool.clone(), user_repo, notifier.clone());

        let gateway_service = GatewayService::new(
            message_service.clone(),
            receipt_service.clone(),
            room_service.clone(),
            presence_service.clone(),
            notifier.clone(),
            config.websocket.clone(),
        );

        let health_service = HealthService::new(pool.clone(), bus, config.health.clone());

        let workers = Workers {
            message_cleanup: MessageCleanupWorker::new(pool, message_repo, config.messaging.clone()),
            notification: NotificationWorker::new(notifier, config.notifications.gc_interval_secs),
            presence_sweep: PresenceSweepWorker::new(presence_service.clone(), config.presence.sweep_interval_secs),
        };

        let services = ServiceContainer {
            message_service,
            receipt_service,
            room_service,
            session_service,
            user_service,
            presence_service,
            gateway_service,
        };

        Ok(App { services, health_service, workers })
    }
}
