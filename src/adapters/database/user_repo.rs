use crate::adapters::database::records::UserRecord;
use crate::domain::user::User;
use crate::error::Result;
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct UserRepository {}

impl UserRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_by_id(&self, conn: &mut PgConnection, user_id: Uuid) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, avatar_url, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }

    /// Counts how many of `user_ids` exist.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn, user_ids), fields(count = user_ids.len()))]
    pub(crate) async fn count_existing(&self, conn: &mut PgConnection, user_ids: &[Uuid]) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ANY($1)")
            .bind(user_ids)
            .fetch_one(conn)
            .await?;
        Ok(count)
    }

    /// Sets or clears the avatar. Returns `None` if the user does not exist.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn, avatar_url))]
    pub(crate) async fn set_avatar(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        avatar_url: Option<&str>,
    ) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            UPDATE users SET avatar_url = $2
            WHERE id = $1
            RETURNING id, username, avatar_url, created_at
            "#,
        )
        .bind(user_id)
        .bind(avatar_url)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }
}
