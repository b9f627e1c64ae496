use crate::adapters::redis::PubSubMessage;
use crate::services::notification_service::NotificationService;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::watch;
use tracing::Instrument;

/// Reclaims idle event channels and, on multi-node deployments, feeds events arriving
/// from the bus into the local hub.
#[derive(Debug)]
pub struct NotificationWorker {
    service: NotificationService,
    gc_interval_secs: u64,
}

impl NotificationWorker {
    #[must_use]
    pub const fn new(service: NotificationService, gc_interval_secs: u64) -> Self {
        Self { service, gc_interval_secs }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut gc_interval = tokio::time::interval(Duration::from_secs(self.gc_interval_secs));

        let mut remote_rx = match self.service.bus() {
            Some(bus) => match bus.subscribe().await {
                Ok(rx) => Some(rx),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to subscribe to the event bus, worker exiting");
                    return;
                }
            },
            None => None,
        };

        tracing::info!(distributed = remote_rx.is_some(), "Notification worker started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,

                _ = gc_interval.tick() => {
                    async {
                        self.service.perform_gc();
                    }
                    .instrument(tracing::debug_span!("notification_gc_iteration"))
                    .await;
                }

                result = recv_remote(remote_rx.as_mut()) => {
                    match result {
                        Ok(message) => self.service.dispatch_remote(&message),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(missed = n, "Event bus dispatcher lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::error!("Event bus stream closed, worker exiting");
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("Notification worker shutting down...");
    }
}

/// Waits on the bus receiver, or forever when events stay node-local.
async fn recv_remote(
    rx: Option<&mut broadcast::Receiver<PubSubMessage>>,
) -> Result<PubSubMessage, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
