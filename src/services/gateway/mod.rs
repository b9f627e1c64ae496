pub(crate) mod ack_batcher;
pub(crate) mod session;

use crate::config::WsConfig;
use crate::domain::notification::ServerEvent;
use crate::services::gateway::session::Session;
use crate::services::message_service::MessageService;
use crate::services::notification_service::NotificationService;
use crate::services::presence_service::PresenceService;
use crate::services::receipt_service::ReceiptService;
use crate::services::room_service::RoomService;
use crate::services::session_service::Principal;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, close_code};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, UpDownCounter},
};

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) ack_batch_size: Histogram<u64>,
    pub(crate) outbound_dropped_total: Counter<u64>,
    pub(crate) active_connections: UpDownCounter<i64>,
    pub(crate) ack_queue_dropped_total: Counter<u64>,
    pub(crate) lagged_events_total: Counter<u64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("ephemera-server");
        Self {
            ack_batch_size: meter
                .u64_histogram("websocket_ack_batch_size")
                .with_description("Size of ACK batches processed")
                .build(),
            outbound_dropped_total: meter
                .u64_counter("websocket_outbound_dropped_total")
                .with_description("Total frames dropped due to full outbound buffer")
                .build(),
            active_connections: meter
                .i64_up_down_counter("websocket_active_connections")
                .with_description("Number of active WebSocket connections")
                .build(),
            ack_queue_dropped_total: meter
                .u64_counter("websocket_ack_queue_dropped_total")
                .with_description("Total ACKs dropped due to full buffer")
                .build(),
            lagged_events_total: meter
                .u64_counter("websocket_lagged_events_total")
                .with_description("Total events skipped because a socket fell behind")
                .build(),
        }
    }
}

/// Serializes an event into a `{"event", "data"}` text frame.
pub(crate) fn encode_event(event: &ServerEvent) -> Option<WsMessage> {
    match serde_json::to_string(event) {
        Ok(json) => Some(WsMessage::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, event = event.name(), "Failed to serialize event");
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct GatewayService {
    message_service: MessageService,
    receipt_service: ReceiptService,
    room_service: RoomService,
    presence: PresenceService,
    notifier: NotificationService,
    config: WsConfig,
    metrics: Metrics,
}

impl GatewayService {
    #[must_use]
    pub fn new(
        message_service: MessageService,
        receipt_service: ReceiptService,
        room_service: RoomService,
        presence: PresenceService,
        notifier: NotificationService,
        config: WsConfig,
    ) -> Self {
        Self { message_service, receipt_service, room_service, presence, notifier, config, metrics: Metrics::new() }
    }

    pub async fn handle_socket(
        &self,
        mut socket: WebSocket,
        principal: Principal,
        request_id: String,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        // Rooms are resolved up front so the socket hears every room it belongs to
        let room_ids = match self.room_service.room_ids(principal.user_id).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load rooms for socket");
                let _ = socket
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: close_code::ERROR,
                        reason: "Internal server error".into(),
                    })))
                    .await;
                return;
            }
        };

        let session = Session {
            principal,
            request_id,
            socket,
            room_ids,
            message_service: self.message_service.clone(),
            receipt_service: self.receipt_service.clone(),
            room_service: self.room_service.clone(),
            presence: self.presence.clone(),
            notifier: self.notifier.clone(),
            metrics: self.metrics.clone(),
            config: self.config.clone(),
            shutdown_rx,
        };

        session.run().await;
    }
}
