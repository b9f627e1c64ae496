use crate::adapters::database::DbPool;
use crate::adapters::database::message_repo::MessageRepository;
use crate::adapters::database::receipt_repo::ReceiptRepository;
use crate::adapters::database::room_repo::RoomRepository;
use crate::config::MessagingConfig;
use crate::domain::message::{Message, MessageType, MessageView, NewMessage, normalize_edit};
use crate::domain::notification::{DeleteScope, EventTarget, ServerEvent};
use crate::domain::receipt::Receipt;
use crate::error::{AppError, Result};
use crate::services::notification_service::NotificationService;
use crate::services::room_service::{RoomService, require_membership};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use sqlx::PgConnection;
use std::collections::HashMap;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    sent_total: Counter<u64>,
    history_page_size: Histogram<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("ephemera-server");
        Self {
            sent_total: meter
                .u64_counter("ephemera_messages_sent_total")
                .with_description("Total messages successfully sent")
                .build(),
            history_page_size: meter
                .u64_histogram("ephemera_history_page_size")
                .with_description("Number of messages returned in a single history page")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MessageService {
    pool: DbPool,
    repo: MessageRepository,
    receipts: ReceiptRepository,
    room_repo: RoomRepository,
    rooms: RoomService,
    notifier: NotificationService,
    config: MessagingConfig,
    metrics: Metrics,
}

impl MessageService {
    #[must_use]
    pub fn new(
        pool: DbPool,
        repo: MessageRepository,
        receipts: ReceiptRepository,
        room_repo: RoomRepository,
        rooms: RoomService,
        notifier: NotificationService,
        config: MessagingConfig,
    ) -> Self {
        Self { pool, repo, receipts, room_repo, rooms, notifier, config, metrics: Metrics::new() }
    }

    /// Validates and stores a message, then announces it to the room.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the payload is invalid for its type.
    /// Returns `AppError::Forbidden` if the sender is not a member of the room.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, message),
        fields(room_id = %message.room_id, message_type = %message.message_type)
    )]
    pub async fn send(&self, sender_id: Uuid, message: NewMessage) -> Result<MessageView> {
        let message = message.validate(self.config.max_content_length)?;
        let expires_at = OffsetDateTime::now_utc() + Duration::days(self.config.ttl_days);

        let mut tx = self.pool.begin().await?;
        require_membership(&self.room_repo, &mut tx, message.room_id, sender_id).await?;
        let stored = self.repo.create(&mut tx, sender_id, &message, expires_at).await?;
        let unhidden = self.room_repo.unhide_for_members(&mut tx, stored.room_id).await?;
        tx.commit().await?;

        tracing::debug!(message_id = %stored.id, "Message stored");
        self.metrics.sent_total.add(1, &[KeyValue::new("type", stored.message_type.as_str())]);

        let room_id = stored.room_id;
        let view = MessageView::project(stored, &[], Some(sender_id));
        self.notifier.notify(EventTarget::Room(room_id), ServerEvent::NewMessage(view.clone())).await;
        self.rooms.announce_unhidden(room_id, &unhidden).await;

        Ok(view)
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the message does not exist or is hidden from the viewer.
    /// Returns `AppError::Forbidden` if the viewer is not a member of the room.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn get(&self, viewer_id: Uuid, message_id: Uuid) -> Result<MessageView> {
        let mut conn = self.pool.acquire().await?;
        let message = self.repo.find_by_id(&mut conn, message_id).await?.ok_or(AppError::NotFound)?;
        let membership = require_membership(&self.room_repo, &mut conn, message.room_id, viewer_id).await?;

        if !message.is_visible_to(viewer_id, membership.cleared_at) {
            return Err(AppError::NotFound);
        }

        self.project_one(&mut conn, message, Some(viewer_id)).await
    }

    /// One page of room history, newest first. `before` is the id of the oldest message
    /// the client already holds.
    ///
    /// # Errors
    /// Returns `AppError::Forbidden` if the viewer is not a member of the room.
    /// Returns `AppError::BadRequest` if `before` does not name a message of this room.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn history(
        &self,
        viewer_id: Uuid,
        room_id: Uuid,
        before: Option<Uuid>,
        limit: Option<i64>,
    ) -> Result<Vec<MessageView>> {
        let limit = limit.unwrap_or(self.config.history_page_size).clamp(1, self.config.history_max_page_size);

        let mut conn = self.pool.acquire().await?;
        let membership = require_membership(&self.room_repo, &mut conn, room_id, viewer_id).await?;

        let cursor = match before {
            Some(id) => Some(
                self.repo
                    .find_cursor(&mut conn, room_id, id)
                    .await?
                    .ok_or_else(|| AppError::BadRequest("Unknown history cursor".into()))?,
            ),
            None => None,
        };

        let messages =
            self.repo.fetch_history(&mut conn, room_id, viewer_id, membership.cleared_at, cursor, limit).await?;
        self.metrics.history_page_size.record(messages.len() as u64, &[]);

        self.project_many(&mut conn, messages, viewer_id).await
    }

    /// Replaces the text of a message the actor sent.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the message is missing or deleted for everyone.
    /// Returns `AppError::Forbidden` if the actor did not send it.
    /// Returns `AppError::BadRequest` for non-text messages or invalid content.
    #[tracing::instrument(err(level = "warn"), skip(self, content))]
    pub async fn edit(&self, actor_id: Uuid, message_id: Uuid, content: &str) -> Result<MessageView> {
        let mut conn = self.pool.acquire().await?;
        let message = self.repo.find_by_id(&mut conn, message_id).await?.ok_or(AppError::NotFound)?;

        if message.is_deleted_for_everyone {
            return Err(AppError::NotFound);
        }
        if message.sender_id != actor_id {
            return Err(AppError::Forbidden("Only the sender can edit a message".into()));
        }
        if message.message_type != MessageType::Text {
            return Err(AppError::BadRequest("Only text messages can be edited".into()));
        }

        let content = normalize_edit(content, self.config.max_content_length)?;
        require_membership(&self.room_repo, &mut conn, message.room_id, actor_id).await?;

        let updated =
            self.repo.update_content(&mut conn, message_id, &content).await?.ok_or(AppError::NotFound)?;
        let room_id = updated.room_id;
        let view = self.project_one(&mut conn, updated, Some(actor_id)).await?;
        drop(conn);

        self.notifier.notify(EventTarget::Room(room_id), ServerEvent::MessageEdited(view.clone())).await;
        Ok(view)
    }

    /// Hides a message from the actor only.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the message does not exist.
    /// Returns `AppError::Forbidden` if the actor is not a member of the room.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn delete_for_me(&self, actor_id: Uuid, message_id: Uuid) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        let message = self.repo.find_by_id(&mut conn, message_id).await?.ok_or(AppError::NotFound)?;
        require_membership(&self.room_repo, &mut conn, message.room_id, actor_id).await?;

        self.repo.delete_for_user(&mut conn, message_id, actor_id).await?.ok_or(AppError::NotFound)?;
        drop(conn);

        let event = ServerEvent::MessageDeleted { message_id, room_id: message.room_id, scope: DeleteScope::Me };
        self.notifier.notify(EventTarget::User(actor_id), event).await;
        Ok(())
    }

    /// Tombstones a message for the whole room.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the message does not exist.
    /// Returns `AppError::Forbidden` if the actor did not send it.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn delete_for_everyone(&self, actor_id: Uuid, message_id: Uuid) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        let message = self.repo.find_by_id(&mut conn, message_id).await?.ok_or(AppError::NotFound)?;

        if message.sender_id != actor_id {
            return Err(AppError::Forbidden("Only the sender can delete a message for everyone".into()));
        }

        self.repo.delete_for_everyone(&mut conn, message_id).await?.ok_or(AppError::NotFound)?;
        drop(conn);

        let event = ServerEvent::MessageDeleted { message_id, room_id: message.room_id, scope: DeleteScope::Everyone };
        self.notifier.notify(EventTarget::Room(message.room_id), event).await;
        Ok(())
    }

    /// Loads the projection of a message for a viewer without membership checks.
    /// Used after the caller already established access.
    pub(crate) async fn view_for(&self, viewer_id: Uuid, message_id: Uuid) -> Result<MessageView> {
        let mut conn = self.pool.acquire().await?;
        let message = self.repo.find_by_id(&mut conn, message_id).await?.ok_or(AppError::NotFound)?;
        self.project_one(&mut conn, message, Some(viewer_id)).await
    }

    async fn project_one(
        &self,
        conn: &mut PgConnection,
        message: Message,
        viewer: Option<Uuid>,
    ) -> Result<MessageView> {
        let receipts = self.receipts.list_for_messages(conn, &[message.id]).await?;
        Ok(MessageView::project(message, &receipts, viewer))
    }

    async fn project_many(
        &self,
        conn: &mut PgConnection,
        messages: Vec<Message>,
        viewer_id: Uuid,
    ) -> Result<Vec<MessageView>> {
        let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let mut by_message: HashMap<Uuid, Vec<Receipt>> = HashMap::new();
        for receipt in self.receipts.list_for_messages(conn, &ids).await? {
            by_message.entry(receipt.message_id).or_default().push(receipt);
        }

        Ok(messages
            .into_iter()
            .map(|message| {
                let receipts = by_message.remove(&message.id).unwrap_or_default();
                MessageView::project(message, &receipts, Some(viewer_id))
            })
            .collect())
    }
}
