use crate::adapters::redis::{EventBus, PubSubMessage};
use crate::config::NotificationConfig;
use crate::domain::notification::{EventEnvelope, EventTarget, ServerEvent};
use dashmap::DashMap;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram, UpDownCounter},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub type EventReceiver = broadcast::Receiver<Arc<ServerEvent>>;
type EventSender = broadcast::Sender<Arc<ServerEvent>>;

#[derive(Clone, Debug)]
struct Metrics {
    sends_total: Counter<u64>,
    received_total: Counter<u64>,
    unrouted_total: Counter<u64>,
    active_channels: UpDownCounter<i64>,
    gc_duration_seconds: Histogram<f64>,
    gc_reclaimed_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("ephemera-server");
        Self {
            sends_total: meter
                .u64_counter("ephemera_events_sent_total")
                .with_description("Total event send attempts")
                .build(),
            received_total: meter
                .u64_counter("ephemera_events_received_total")
                .with_description("Total events received from PubSub")
                .build(),
            unrouted_total: meter
                .u64_counter("ephemera_events_unrouted_total")
                .with_description("Events with no local subscribers")
                .build(),
            active_channels: meter
                .i64_up_down_counter("ephemera_event_channels")
                .with_description("Number of active local event channels")
                .build(),
            gc_duration_seconds: meter
                .f64_histogram("ephemera_event_gc_duration_seconds")
                .with_description("Time taken to perform a single GC iteration")
                .build(),
            gc_reclaimed_total: meter
                .u64_counter("ephemera_event_channels_reclaimed_total")
                .with_description("Total number of stale channels reclaimed by GC")
                .build(),
        }
    }
}

/// Fans server events out to user, room and global channels on this node, and through the
/// pub/sub bus to every other node when one is configured.
#[derive(Clone, Debug)]
pub struct NotificationService {
    bus: Option<EventBus>,
    users: Arc<DashMap<Uuid, EventSender>>,
    rooms: Arc<DashMap<Uuid, EventSender>>,
    global: EventSender,
    channel_capacity: usize,
    metrics: Metrics,
}

impl NotificationService {
    #[must_use]
    pub fn new(bus: Option<EventBus>, config: &NotificationConfig) -> Self {
        let (global, _) = broadcast::channel(config.channel_capacity);
        Self {
            bus,
            users: Arc::new(DashMap::new()),
            rooms: Arc::new(DashMap::new()),
            global,
            channel_capacity: config.channel_capacity,
            metrics: Metrics::new(),
        }
    }

    #[must_use]
    pub const fn bus(&self) -> Option<&EventBus> {
        self.bus.as_ref()
    }

    /// Announces an event. Delivery is best effort: nothing is retried or replayed.
    #[tracing::instrument(skip(self, event), fields(target = ?target, event = event.name()))]
    pub async fn notify(&self, target: EventTarget, event: ServerEvent) {
        let label = KeyValue::new("event", event.name());

        if let Some(bus) = &self.bus {
            let envelope = EventEnvelope { target, event };
            match bus.publish(&envelope).await {
                Ok(()) => {
                    // Every node, this one included, dispatches on receipt
                    self.metrics.sends_total.add(1, &[label, KeyValue::new("status", "published")]);
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to publish event, dispatching locally");
                    self.metrics.sends_total.add(1, &[label, KeyValue::new("status", "fallback")]);
                    self.dispatch(envelope.target, Arc::new(envelope.event));
                    return;
                }
            }
        }

        self.metrics.sends_total.add(1, &[label, KeyValue::new("status", "local")]);
        self.dispatch(target, Arc::new(event));
    }

    pub async fn notify_users(&self, user_ids: &[Uuid], event: &ServerEvent) {
        for user_id in user_ids {
            self.notify(EventTarget::User(*user_id), event.clone()).await;
        }
    }

    /// Handles a payload received from the pub/sub bus.
    pub fn dispatch_remote(&self, message: &PubSubMessage) {
        if let Some(envelope) = EventBus::decode(message) {
            self.metrics.received_total.add(1, &[KeyValue::new("event", envelope.event.name())]);
            self.dispatch(envelope.target, Arc::new(envelope.event));
        }
    }

    /// Hands an event to the local subscribers of `target`.
    pub fn dispatch(&self, target: EventTarget, event: Arc<ServerEvent>) {
        let sender = match target {
            EventTarget::User(id) => self.users.get(&id).map(|tx| tx.value().clone()),
            EventTarget::Room(id) => self.rooms.get(&id).map(|tx| tx.value().clone()),
            EventTarget::Global => Some(self.global.clone()),
        };

        let name = event.name();
        match sender.map(|tx| tx.send(event)) {
            Some(Ok(receivers)) => tracing::trace!(?target, event = name, receivers, "Dispatched event"),
            _ => {
                tracing::debug!(?target, event = name, "No local subscriber for event");
                self.metrics.unrouted_total.add(1, &[KeyValue::new("event", name)]);
            }
        }
    }

    pub fn subscribe_user(&self, user_id: Uuid) -> EventReceiver {
        Self::subscribe_in(&self.users, user_id, self.channel_capacity, &self.metrics)
    }

    pub fn subscribe_room(&self, room_id: Uuid) -> EventReceiver {
        Self::subscribe_in(&self.rooms, room_id, self.channel_capacity, &self.metrics)
    }

    #[must_use]
    pub fn subscribe_global(&self) -> EventReceiver {
        self.global.subscribe()
    }

    fn subscribe_in(
        channels: &DashMap<Uuid, EventSender>,
        key: Uuid,
        capacity: usize,
        metrics: &Metrics,
    ) -> EventReceiver {
        channels
            .entry(key)
            .or_insert_with(|| {
                metrics.active_channels.add(1, &[]);
                let (tx, _rx) = broadcast::channel(capacity);
                tx
            })
            .value()
            .subscribe()
    }

    /// Reclaims user and room channels that no longer have receivers.
    pub fn perform_gc(&self) {
        let start = std::time::Instant::now();
        let mut reclaimed: u64 = 0;

        for channels in [&self.users, &self.rooms] {
            channels.retain(|_, sender| {
                let active = sender.receiver_count() > 0;
                if !active {
                    self.metrics.active_channels.add(-1, &[]);
                    reclaimed += 1;
                }
                active
            });
        }

        let duration = start.elapsed().as_secs_f64();
        self.metrics.gc_duration_seconds.record(duration, &[]);

        if reclaimed > 0 {
            self.metrics.gc_reclaimed_total.add(reclaimed, &[]);
            tracing::info!(reclaimed, "Event channel GC reclaimed stale channels");
        }
        tracing::debug!(duration_secs = %duration, "Event channel GC cycle completed");
    }
}
