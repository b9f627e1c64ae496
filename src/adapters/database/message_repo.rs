use crate::adapters::database::records::MessageRecord;
use crate::domain::message::{Message, NewMessage};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct MessageRepository {}

impl MessageRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Records a new message in the database.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the room or sender does not exist.
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, message), fields(room_id = %message.room_id))]
    pub(crate) async fn create(
        &self,
        conn: &mut PgConnection,
        sender_id: Uuid,
        message: &NewMessage,
        expires_at: OffsetDateTime,
    ) -> Result<Message> {
        let result = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (
                room_id, user_id, message_type, content, media_url, media_mime, media_size,
                duration_ms, metadata, is_view_once, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, room_id, user_id, message_type, content, media_url, media_mime, media_size,
                      duration_ms, metadata, is_view_once, is_deleted_for_everyone, deleted_for_user_ids,
                      edited_at, created_at, expires_at
            "#,
        )
        .bind(message.room_id)
        .bind(sender_id)
        .bind(message.message_type.as_str())
        .bind(message.content.as_deref())
        .bind(message.media_url.as_deref())
        .bind(message.media_mime.as_deref())
        .bind(message.media_size)
        .bind(message.duration_ms)
        .bind(message.metadata.as_ref())
        .bind(message.is_view_once)
        .bind(expires_at)
        .fetch_one(conn)
        .await;

        match result {
            Ok(record) => record.try_into(),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23503") => {
                // Foreign key violation: room or sender does not exist
                Err(AppError::NotFound)
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// Fetches a single unexpired message.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_by_id(&self, conn: &mut PgConnection, message_id: Uuid) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, room_id, user_id, message_type, content, media_url, media_mime, media_size,
                   duration_ms, metadata, is_view_once, is_deleted_for_everyone, deleted_for_user_ids,
                   edited_at, created_at, expires_at
            FROM messages
            WHERE id = $1 AND expires_at > NOW()
            "#,
        )
        .bind(message_id)
        .fetch_optional(conn)
        .await?;

        record.map(TryInto::try_into).transpose()
    }

    /// Resolves a history cursor to its position within a room. Expired messages still
    /// resolve, so a client holding one can keep paging back.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_cursor(
        &self,
        conn: &mut PgConnection,
        room_id: Uuid,
        message_id: Uuid,
    ) -> Result<Option<(OffsetDateTime, Uuid)>> {
        let cursor = sqlx::query_as::<_, (OffsetDateTime, Uuid)>(
            r#"
            SELECT created_at, id
            FROM messages
            WHERE id = $1 AND room_id = $2
            "#,
        )
        .bind(message_id)
        .bind(room_id)
        .fetch_optional(conn)
        .await?;

        Ok(cursor)
    }

    /// Replaces the content of a message and stamps `edited_at`.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn, content))]
    pub(crate) async fn update_content(
        &self,
        conn: &mut PgConnection,
        message_id: Uuid,
        content: &str,
    ) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            UPDATE messages
            SET content = $2, edited_at = NOW()
            WHERE id = $1 AND NOT is_deleted_for_everyone
            RETURNING id, room_id, user_id, message_type, content, media_url, media_mime, media_size,
                      duration_ms, metadata, is_view_once, is_deleted_for_everyone, deleted_for_user_ids,
                      edited_at, created_at, expires_at
            "#,
        )
        .bind(message_id)
        .bind(content)
        .fetch_optional(conn)
        .await?;

        record.map(TryInto::try_into).transpose()
    }

    /// Hides a message for one user. Adding the same user twice is a no-op.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn delete_for_user(
        &self,
        conn: &mut PgConnection,
        message_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            UPDATE messages
            SET deleted_for_user_ids = CASE
                WHEN $2 = ANY(deleted_for_user_ids) THEN deleted_for_user_ids
                ELSE array_append(deleted_for_user_ids, $2)
            END
            WHERE id = $1
            RETURNING id, room_id, user_id, message_type, content, media_url, media_mime, media_size,
                      duration_ms, metadata, is_view_once, is_deleted_for_everyone, deleted_for_user_ids,
                      edited_at, created_at, expires_at
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        record.map(TryInto::try_into).transpose()
    }

    /// Tombstones a message for every member, dropping its payload.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn delete_for_everyone(
        &self,
        conn: &mut PgConnection,
        message_id: Uuid,
    ) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            UPDATE messages
            SET is_deleted_for_everyone = TRUE,
                content = NULL,
                media_url = NULL,
                media_mime = NULL,
                media_size = NULL,
                duration_ms = NULL,
                metadata = NULL
            WHERE id = $1
            RETURNING id, room_id, user_id, message_type, content, media_url, media_mime, media_size,
                      duration_ms, metadata, is_view_once, is_deleted_for_everyone, deleted_for_user_ids,
                      edited_at, created_at, expires_at
            "#,
        )
        .bind(message_id)
        .fetch_optional(conn)
        .await?;

        record.map(TryInto::try_into).transpose()
    }

    /// Fetches one page of a room's history as seen by `viewer_id`, newest first.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn fetch_history(
        &self,
        conn: &mut PgConnection,
        room_id: Uuid,
        viewer_id: Uuid,
        cleared_at: Option<OffsetDateTime>,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Message>> {
        let records = match cursor {
            Some((before_ts, before_id)) => {
                sqlx::query_as::<_, MessageRecord>(
                    r#"
                    SELECT id, room_id, user_id, message_type, content, media_url, media_mime, media_size,
                           duration_ms, metadata, is_view_once, is_deleted_for_everyone, deleted_for_user_ids,
                           edited_at, created_at, expires_at
                    FROM messages
                    WHERE room_id = $1
                      AND NOT ($2 = ANY(deleted_for_user_ids))
                      AND ($3::timestamptz IS NULL OR created_at > $3)
                      AND expires_at > NOW()
                      AND (created_at, id) < ($4, $5)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $6
                    "#,
                )
                .bind(room_id)
                .bind(viewer_id)
                .bind(cleared_at)
                .bind(before_ts)
                .bind(before_id)
                .bind(limit)
                .fetch_all(conn)
                .await?
            }
            None => {
                sqlx::query_as::<_, MessageRecord>(
                    r#"
                    SELECT id, room_id, user_id, message_type, content, media_url, media_mime, media_size,
                           duration_ms, metadata, is_view_once, is_deleted_for_everyone, deleted_for_user_ids,
                           edited_at, created_at, expires_at
                    FROM messages
                    WHERE room_id = $1
                      AND NOT ($2 = ANY(deleted_for_user_ids))
                      AND ($3::timestamptz IS NULL OR created_at > $3)
                      AND expires_at > NOW()
                    ORDER BY created_at DESC, id DESC
                    LIMIT $4
                    "#,
                )
                .bind(room_id)
                .bind(viewer_id)
                .bind(cleared_at)
                .bind(limit)
                .fetch_all(conn)
                .await?
            }
        };

        records.into_iter().map(TryInto::try_into).collect()
    }

    /// Deletes all expired messages. Their receipts go with them.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the deletion fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn delete_expired(&self, conn: &mut PgConnection) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE expires_at < NOW()").execute(conn).await?;
        Ok(result.rows_affected())
    }
}
