use crate::adapters::database::records::{MembershipRecord, RoomRecord, RoomSummaryRecord};
use crate::domain::room::{MemberRole, Membership, MembershipPatch, Room, RoomKind, RoomSummary};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct RoomRepository {}

impl RoomRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// # Errors
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, name))]
    pub(crate) async fn create(
        &self,
        conn: &mut PgConnection,
        kind: RoomKind,
        name: Option<&str>,
        created_by: Uuid,
    ) -> Result<Room> {
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            INSERT INTO rooms (kind, name, created_by)
            VALUES ($1, $2, $3)
            RETURNING id, kind, name, created_by, created_at
            "#,
        )
        .bind(kind.as_str())
        .bind(name)
        .bind(created_by)
        .fetch_one(conn)
        .await?;

        record.try_into()
    }

    /// Serializes direct-room creation for one pair of users until the transaction ends.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the lock cannot be taken.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn lock_direct_pair(&self, conn: &mut PgConnection, a: Uuid, b: Uuid) -> Result<()> {
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text || ':' || $2::text, 0))")
            .bind(low)
            .bind(high)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_direct(&self, conn: &mut PgConnection, a: Uuid, b: Uuid) -> Result<Option<Room>> {
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT r.id, r.kind, r.name, r.created_by, r.created_at
            FROM rooms r
            WHERE r.kind = 'direct'
              AND EXISTS (SELECT 1 FROM room_members WHERE room_id = r.id AND user_id = $1)
              AND EXISTS (SELECT 1 FROM room_members WHERE room_id = r.id AND user_id = $2)
            ORDER BY r.created_at ASC
            LIMIT 1
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_optional(conn)
        .await?;

        record.map(TryInto::try_into).transpose()
    }

    /// Adds a member. Returns `false` if the user already belonged to the room.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the room or user does not exist.
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn add_member(
        &self,
        conn: &mut PgConnection,
        room_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO room_members (room_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (room_id, user_id) DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(conn)
        .await;

        match result {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23503") => Err(AppError::NotFound),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// # Errors
    /// Returns `AppError::Database` if the delete fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn remove_member(&self, conn: &mut PgConnection, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM room_members WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_membership(
        &self,
        conn: &mut PgConnection,
        room_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>> {
        let record = sqlx::query_as::<_, MembershipRecord>(
            r#"
            SELECT room_id, user_id, role, is_pinned, is_archived, is_hidden, cleared_at, joined_at
            FROM room_members
            WHERE room_id = $1 AND user_id = $2
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        record.map(TryInto::try_into).transpose()
    }

    /// Applies the flags present in `patch`, leaving the others unchanged.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn update_flags(
        &self,
        conn: &mut PgConnection,
        room_id: Uuid,
        user_id: Uuid,
        patch: MembershipPatch,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE room_members
            SET is_pinned = COALESCE($3, is_pinned),
                is_archived = COALESCE($4, is_archived),
                is_hidden = COALESCE($5, is_hidden)
            WHERE room_id = $1 AND user_id = $2
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .bind(patch.is_pinned)
        .bind(patch.is_archived)
        .bind(patch.is_hidden)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Hides everything currently in the room from this member.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn clear(&self, conn: &mut PgConnection, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE room_members SET cleared_at = NOW() WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clears the hidden flag for every member that had hidden the room, returning who changed.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn unhide_for_members(&self, conn: &mut PgConnection, room_id: Uuid) -> Result<Vec<Uuid>> {
        let users = sqlx::query_scalar::<_, Uuid>(
            "UPDATE room_members SET is_hidden = FALSE WHERE room_id = $1 AND is_hidden RETURNING user_id",
        )
        .bind(room_id)
        .fetch_all(conn)
        .await?;
        Ok(users)
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn room_ids_for_user(&self, conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT room_id FROM room_members WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(conn)
            .await?;
        Ok(ids)
    }

    /// Lists a user's rooms, pinned first and then by most recent activity.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn list_summaries(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        include_hidden: bool,
    ) -> Result<Vec<RoomSummary>> {
        let records = sqlx::query_as::<_, RoomSummaryRecord>(
            r#"
            SELECT * FROM (
                SELECT r.id, r.kind, r.name, r.created_by, r.created_at,
                       rm.role, rm.is_pinned, rm.is_archived, rm.is_hidden, rm.cleared_at,
                       ARRAY(
                           SELECT o.user_id FROM room_members o
                           WHERE o.room_id = r.id
                           ORDER BY o.joined_at, o.user_id
                       ) AS member_ids,
                       (
                           SELECT MAX(m.created_at) FROM messages m
                           WHERE m.room_id = r.id AND m.expires_at > NOW()
                       ) AS last_message_at
                FROM room_members rm
                JOIN rooms r ON r.id = rm.room_id
                WHERE rm.user_id = $1 AND ($2 OR NOT rm.is_hidden)
            ) s
            ORDER BY s.is_pinned DESC, COALESCE(s.last_message_at, s.created_at) DESC, s.id
            "#,
        )
        .bind(user_id)
        .bind(include_hidden)
        .fetch_all(conn)
        .await?;

        records.into_iter().map(TryInto::try_into).collect()
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_summary(
        &self,
        conn: &mut PgConnection,
        room_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<RoomSummary>> {
        let record = sqlx::query_as::<_, RoomSummaryRecord>(
            r#"
            SELECT r.id, r.kind, r.name, r.created_by, r.created_at,
                   rm.role, rm.is_pinned, rm.is_archived, rm.is_hidden, rm.cleared_at,
                   ARRAY(
                       SELECT o.user_id FROM room_members o
                       WHERE o.room_id = r.id
                       ORDER BY o.joined_at, o.user_id
                   ) AS member_ids,
                   (
                       SELECT MAX(m.created_at) FROM messages m
                       WHERE m.room_id = r.id AND m.expires_at > NOW()
                   ) AS last_message_at
            FROM room_members rm
            JOIN rooms r ON r.id = rm.room_id
            WHERE rm.room_id = $1 AND rm.user_id = $2
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        record.map(TryInto::try_into).transpose()
    }
}
