use crate::adapters::database::records::{NewReceiptRecord, ReceiptRecord};
use crate::domain::receipt::{Receipt, ReceiptKind};
use crate::error::Result;
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct ReceiptRepository {}

impl ReceiptRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Records `kind` and every kind it implies for `user_id` on each of `message_ids`.
    ///
    /// Only messages the user can still see in rooms they belong to, and did not send, are
    /// acknowledged. Existing rows are left untouched, so the result holds
    /// exactly the receipts this call added.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, message_ids), fields(count = message_ids.len()))]
    pub(crate) async fn record(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        message_ids: &[Uuid],
        kind: ReceiptKind,
    ) -> Result<Vec<NewReceiptRecord>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let kinds: Vec<&str> = kind.implied().iter().map(|k| k.as_str()).collect();

        let records = sqlx::query_as::<_, NewReceiptRecord>(
            r#"
            WITH inserted AS (
                INSERT INTO message_receipts (message_id, user_id, kind)
                SELECT m.id, $1, k.kind
                FROM messages m
                JOIN room_members rm ON rm.room_id = m.room_id AND rm.user_id = $1
                CROSS JOIN unnest($3::text[]) AS k(kind)
                WHERE m.id = ANY($2)
                  AND m.user_id <> $1
                  AND NOT m.is_deleted_for_everyone
                  AND NOT ($1 = ANY(m.deleted_for_user_ids))
                  AND (rm.cleared_at IS NULL OR m.created_at > rm.cleared_at)
                  AND m.expires_at > NOW()
                ON CONFLICT (message_id, user_id, kind) DO NOTHING
                RETURNING message_id, kind, recorded_at
            )
            SELECT i.message_id, m.room_id, m.user_id AS sender_id, i.kind, i.recorded_at
            FROM inserted i
            JOIN messages m ON m.id = i.message_id
            ORDER BY m.created_at, m.id
            "#,
        )
        .bind(user_id)
        .bind(message_ids)
        .bind(&kinds)
        .fetch_all(conn)
        .await?;

        Ok(records)
    }

    /// Marks every message of a room that the user can see and has not sent as read.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn record_room_read(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        room_id: Uuid,
    ) -> Result<Vec<NewReceiptRecord>> {
        let kinds: Vec<&str> = ReceiptKind::Read.implied().iter().map(|k| k.as_str()).collect();

        let records = sqlx::query_as::<_, NewReceiptRecord>(
            r#"
            WITH inserted AS (
                INSERT INTO message_receipts (message_id, user_id, kind)
                SELECT m.id, $1, k.kind
                FROM messages m
                JOIN room_members rm ON rm.room_id = m.room_id AND rm.user_id = $1
                CROSS JOIN unnest($3::text[]) AS k(kind)
                WHERE m.room_id = $2
                  AND m.user_id <> $1
                  AND NOT m.is_deleted_for_everyone
                  AND NOT ($1 = ANY(m.deleted_for_user_ids))
                  AND (rm.cleared_at IS NULL OR m.created_at > rm.cleared_at)
                  AND m.expires_at > NOW()
                ON CONFLICT (message_id, user_id, kind) DO NOTHING
                RETURNING message_id, kind, recorded_at
            )
            SELECT i.message_id, m.room_id, m.user_id AS sender_id, i.kind, i.recorded_at
            FROM inserted i
            JOIN messages m ON m.id = i.message_id
            ORDER BY m.created_at, m.id
            "#,
        )
        .bind(user_id)
        .bind(room_id)
        .bind(&kinds)
        .fetch_all(conn)
        .await?;

        Ok(records)
    }

    /// Loads the full ledger for a set of messages.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn, message_ids), fields(count = message_ids.len()))]
    pub(crate) async fn list_for_messages(
        &self,
        conn: &mut PgConnection,
        message_ids: &[Uuid],
    ) -> Result<Vec<Receipt>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let records = sqlx::query_as::<_, ReceiptRecord>(
            r#"
            SELECT message_id, user_id, kind, recorded_at
            FROM message_receipts
            WHERE message_id = ANY($1)
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(message_ids)
        .fetch_all(conn)
        .await?;

        records.into_iter().map(TryInto::try_into).collect()
    }
}
