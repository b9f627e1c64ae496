use crate::services::presence_service::PresenceService;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

/// Marks users offline once their heartbeats stop, even if a socket never closed cleanly.
#[derive(Debug)]
pub struct PresenceSweepWorker {
    service: PresenceService,
    interval_secs: u64,
}

impl PresenceSweepWorker {
    #[must_use]
    pub const fn new(service: PresenceService, interval_secs: u64) -> Self {
        Self { service, interval_secs }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    self.service.sweep().instrument(tracing::debug_span!("presence_sweep_iteration")).await;
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Presence sweep loop shutting down...");
    }
}
