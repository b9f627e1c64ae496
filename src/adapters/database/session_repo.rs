use crate::adapters::database::records::SessionRecord;
use crate::domain::session::UserSession;
use crate::error::Result;
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct SessionRepository {}

impl SessionRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Bumps `last_active_at` for a live session. Returns `None` when the session was revoked
    /// or belongs to someone else.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn touch(
        &self,
        conn: &mut PgConnection,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<UserSession>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            r#"
            UPDATE user_sessions
            SET last_active_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, device_name, browser, os, ip_address, created_at, last_active_at
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn list(&self, conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<UserSession>> {
        let records = sqlx::query_as::<_, SessionRecord>(
            r#"
            SELECT id, user_id, device_name, browser, os, ip_address, created_at, last_active_at
            FROM user_sessions
            WHERE user_id = $1
            ORDER BY last_active_at DESC, id
            "#,
        )
        .bind(user_id)
        .fetch_all(conn)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    /// # Errors
    /// Returns `AppError::Database` if the delete fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn delete(&self, conn: &mut PgConnection, session_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(user_id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every session of the user except `keep`, returning the revoked ids.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the delete fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn delete_others(&self, conn: &mut PgConnection, user_id: Uuid, keep: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM user_sessions WHERE user_id = $1 AND id <> $2 RETURNING id",
        )
        .bind(user_id)
        .bind(keep)
        .fetch_all(conn)
        .await?;
        Ok(ids)
    }
}
