use crate::domain::message::{Message, MessageType};
use crate::error::{AppError, Result};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRecord {
    pub(crate) id: Uuid,
    pub(crate) room_id: Uuid,
    pub(crate) user_id: Uuid,
    pub(crate) message_type: String,
    pub(crate) content: Option<String>,
    pub(crate) media_url: Option<String>,
    pub(crate) media_mime: Option<String>,
    pub(crate) media_size: Option<i64>,
    pub(crate) duration_ms: Option<i32>,
    pub(crate) metadata: Option<serde_json::Value>,
    pub(crate) is_view_once: bool,
    pub(crate) is_deleted_for_everyone: bool,
    pub(crate) deleted_for_user_ids: Vec<Uuid>,
    pub(crate) edited_at: Option<OffsetDateTime>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) expires_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for Message {
    type Error = AppError;

    fn try_from(record: MessageRecord) -> Result<Self> {
        let message_type = record.message_type.parse::<MessageType>().map_err(|_| {
            tracing::error!(message_id = %record.id, message_type = %record.message_type, "Stored message has unknown type");
            AppError::Internal
        })?;

        Ok(Self {
            id: record.id,
            room_id: record.room_id,
            sender_id: record.user_id,
            message_type,
            content: record.content,
            media_url: record.media_url,
            media_mime: record.media_mime,
            media_size: record.media_size,
            duration_ms: record.duration_ms,
            metadata: record.metadata,
            is_view_once: record.is_view_once,
            is_deleted_for_everyone: record.is_deleted_for_everyone,
            deleted_for_user_ids: record.deleted_for_user_ids,
            edited_at: record.edited_at,
            created_at: record.created_at,
            expires_at: record.expires_at,
        })
    }
}
