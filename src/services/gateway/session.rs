use crate::config::WsConfig;
use crate::domain::gateway::{ClientEvent, OutgoingMessage};
use crate::domain::notification::ServerEvent;
use crate::domain::receipt::ReceiptKind;
use crate::services::gateway::{Metrics, ack_batcher::AckBatcher, encode_event};
use crate::services::message_service::MessageService;
use crate::services::notification_service::NotificationService;
use crate::services::presence_service::PresenceService;
use crate::services::receipt_service::ReceiptService;
use crate::services::room_service::RoomService;
use crate::services::session_service::Principal;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::StreamMap;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use uuid::Uuid;

/// Close code sent when the session behind the socket was revoked.
const CLOSE_SESSION_REVOKED: u16 = 4001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Channel {
    User,
    Global,
    Room(Uuid),
}

/// What the loop should do after handling an event or frame.
enum Flow {
    Continue,
    Close(Option<CloseFrame>),
}

pub struct Session {
    pub principal: Principal,
    pub request_id: String,
    pub socket: WebSocket,
    pub room_ids: Vec<Uuid>,
    pub message_service: MessageService,
    pub receipt_service: ReceiptService,
    pub room_service: RoomService,
    pub presence: PresenceService,
    pub notifier: NotificationService,
    pub metrics: Metrics,
    pub config: WsConfig,
    pub shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

impl Session {
    #[tracing::instrument(
        name = "websocket_session",
        skip(self),
        fields(
            user_id = %self.principal.user_id,
            session_id = %self.principal.session_id,
            request_id = %self.request_id,
            otel.kind = "server"
        )
    )]
    pub(crate) async fn run(self) {
        let Self {
            principal,
            socket,
            room_ids,
            message_service,
            receipt_service,
            room_service,
            presence,
            notifier,
            metrics,
            config,
            mut shutdown_rx,
            ..
        } = self;
        let user_id = principal.user_id;

        metrics.active_connections.add(1, &[]);
        tracing::info!("WebSocket connected");

        let mut streams = StreamMap::new();
        streams.insert(Channel::User, BroadcastStream::new(notifier.subscribe_user(user_id)));
        streams.insert(Channel::Global, BroadcastStream::new(notifier.subscribe_global()));
        for room_id in room_ids {
            streams.insert(Channel::Room(room_id), BroadcastStream::new(notifier.subscribe_room(room_id)));
        }

        presence.connect(user_id).await;

        let (mut ws_sink, mut ws_stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<WsMessage>(config.outbound_buffer_size);

        let ack_batcher = AckBatcher::new(
            user_id,
            receipt_service,
            metrics.clone(),
            config.ack_buffer_size,
            config.ack_batch_size,
            config.ack_flush_interval_ms,
        );

        let ping_timeout = Duration::from_secs(config.ping_interval_secs + config.ping_timeout_secs);
        let mut ping_interval = tokio::time::interval(Duration::from_secs(config.ping_interval_secs));
        ping_interval.tick().await;
        let mut last_heard = Instant::now();

        loop {
            if *shutdown_rx.borrow() {
                tracing::info!("Shutdown signal received, closing WebSocket");
                let _ = ws_sink
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "Server shutting down".into(),
                    })))
                    .await;
                break;
            }

            let flow = tokio::select! {
                biased;

                _ = shutdown_rx.changed() => Flow::Continue,

                msg = ws_stream.next() => {
                    last_heard = Instant::now();
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<ClientEvent>(text.as_str()) {
                                Ok(event) => {
                                    Self::handle_client_event(
                                        event,
                                        user_id,
                                        &mut streams,
                                        &notifier,
                                        &room_service,
                                        &message_service,
                                        &presence,
                                        &ack_batcher,
                                        &outbound_tx,
                                        &metrics,
                                    )
                                    .await;
                                }
                                Err(e) => {
                                    tracing::debug!(error = %e, "Received malformed frame");
                                    let reply = ServerEvent::Error { client_id: None, error: "Malformed frame".into() };
                                    Self::enqueue(&outbound_tx, &metrics, &reply);
                                }
                            }
                            Flow::Continue
                        }
                        Some(Ok(WsMessage::Binary(_))) => {
                            tracing::warn!("Received unexpected binary frame");
                            Flow::Continue
                        }
                        Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => Flow::Continue,
                        Some(Ok(WsMessage::Close(_)) | Err(_)) | None => Flow::Close(None),
                    }
                }

                msg = outbound_rx.recv() => {
                    match msg {
                        Some(msg) => {
                            if ws_sink.send(msg).await.is_err() { Flow::Close(None) } else { Flow::Continue }
                        }
                        None => Flow::Close(None),
                    }
                }

                Some((channel, item)) = streams.next() => {
                    match item {
                        Ok(event) => {
                            let flow = Self::control_flow(&event, principal, &mut streams, &notifier);
                            match encode_event(&event) {
                                Some(frame) => {
                                    if ws_sink.send(frame).await.is_err() { Flow::Close(None) } else { flow }
                                }
                                None => flow,
                            }
                        }
                        Err(BroadcastStreamRecvError::Lagged(missed)) => {
                            tracing::warn!(?channel, missed, "Socket lagged behind, events dropped");
                            metrics.lagged_events_total.add(missed, &[]);
                            Flow::Continue
                        }
                    }
                }

                _ = ping_interval.tick() => {
                    if last_heard.elapsed() > ping_timeout {
                        tracing::info!("WebSocket idle past ping timeout");
                        Flow::Close(Some(CloseFrame { code: close_code::AWAY, reason: "Ping timeout".into() }))
                    } else if ws_sink.send(WsMessage::Ping(Default::default())).await.is_err() {
                        Flow::Close(None)
                    } else {
                        Flow::Continue
                    }
                }
            };

            if let Flow::Close(frame) = flow {
                if let Some(frame) = frame {
                    let _ = ws_sink.send(WsMessage::Close(Some(frame))).await;
                }
                break;
            }
        }

        let _ = ws_sink.close().await;

        // Pending acknowledgments still reach the ledger after the socket is gone
        drop(ack_batcher.close());

        presence.disconnect(user_id).await;
        metrics.active_connections.add(-1, &[]);
        tracing::info!("WebSocket disconnected");
    }

    /// Applies the side effects an event has on this socket: revocation closes it and
    /// membership changes adjust room subscriptions.
    fn control_flow(
        event: &Arc<ServerEvent>,
        principal: Principal,
        streams: &mut StreamMap<Channel, BroadcastStream<Arc<ServerEvent>>>,
        notifier: &NotificationService,
    ) -> Flow {
        let user_id = principal.user_id;
        match event.as_ref() {
            ServerEvent::SessionRevoked { session_id } if *session_id == principal.session_id => {
                tracing::info!("Session revoked, closing WebSocket");
                Flow::Close(Some(CloseFrame { code: CLOSE_SESSION_REVOKED, reason: "Session revoked".into() }))
            }
            ServerEvent::SessionsRevokedOthers { kept_session_id, .. } if *kept_session_id != principal.session_id => {
                tracing::info!("Session revoked by another device, closing WebSocket");
                Flow::Close(Some(CloseFrame { code: CLOSE_SESSION_REVOKED, reason: "Session revoked".into() }))
            }
            ServerEvent::GroupCreated { room, member_ids } if member_ids.contains(&user_id) => {
                Self::join(streams, notifier, room.id);
                Flow::Continue
            }
            ServerEvent::GroupMemberAdded { room_id, user_id: added, .. } if *added == user_id => {
                Self::join(streams, notifier, *room_id);
                Flow::Continue
            }
            ServerEvent::GroupMemberRemoved { room_id, user_id: removed, .. } if *removed == user_id => {
                streams.remove(&Channel::Room(*room_id));
                Flow::Continue
            }
            _ => Flow::Continue,
        }
    }

    fn join(
        streams: &mut StreamMap<Channel, BroadcastStream<Arc<ServerEvent>>>,
        notifier: &NotificationService,
        room_id: Uuid,
    ) {
        if !streams.contains_key(&Channel::Room(room_id)) {
            streams.insert(Channel::Room(room_id), BroadcastStream::new(notifier.subscribe_room(room_id)));
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_client_event(
        event: ClientEvent,
        user_id: Uuid,
        streams: &mut StreamMap<Channel, BroadcastStream<Arc<ServerEvent>>>,
        notifier: &NotificationService,
        room_service: &RoomService,
        message_service: &MessageService,
        presence: &PresenceService,
        ack_batcher: &AckBatcher,
        outbound_tx: &mpsc::Sender<WsMessage>,
        metrics: &Metrics,
    ) {
        match event {
            ClientEvent::JoinRoom { room_id } => match room_service.ensure_member(room_id, user_id).await {
                Ok(_) => Self::join(streams, notifier, room_id),
                Err(e) => {
                    let reply = ServerEvent::Error { client_id: None, error: e.public_message() };
                    Self::enqueue(outbound_tx, metrics, &reply);
                }
            },
            ClientEvent::LeaveRoom { room_id } => {
                streams.remove(&Channel::Room(room_id));
            }
            ClientEvent::SendMessage(outgoing) => {
                Self::spawn_send(user_id, outgoing, message_service.clone(), outbound_tx.clone(), metrics.clone());
            }
            ClientEvent::Heartbeat => presence.heartbeat(user_id).await,
            ClientEvent::Delivered { message_ids } => ack_batcher.push(ReceiptKind::Delivered, message_ids),
            ClientEvent::Read { message_ids } => ack_batcher.push(ReceiptKind::Read, message_ids),
        }
    }

    /// Stores the message off the socket loop and answers with `message:sent` or `error`.
    fn spawn_send(
        user_id: Uuid,
        outgoing: OutgoingMessage,
        message_service: MessageService,
        outbound_tx: mpsc::Sender<WsMessage>,
        metrics: Metrics,
    ) {
        let OutgoingMessage { client_id, message } = outgoing;
        tokio::spawn(async move {
            let reply = match message_service.send(user_id, message).await {
                Ok(message) => ServerEvent::MessageSent { client_id, message },
                Err(e) => ServerEvent::Error { client_id, error: e.public_message() },
            };
            Self::enqueue(&outbound_tx, &metrics, &reply);
        });
    }

    fn enqueue(outbound_tx: &mpsc::Sender<WsMessage>, metrics: &Metrics, event: &ServerEvent) {
        let Some(frame) = encode_event(event) else {
            return;
        };
        if outbound_tx.try_send(frame).is_err() {
            tracing::warn!(event = event.name(), "Dropped reply due to full outbound buffer");
            metrics.outbound_dropped_total.add(1, &[]);
        }
    }
}
