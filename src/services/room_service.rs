use crate::adapters::database::DbPool;
use crate::adapters::database::room_repo::RoomRepository;
use crate::adapters::database::user_repo::UserRepository;
use crate::domain::notification::{EventTarget, ServerEvent};
use crate::domain::room::{MemberRole, Membership, MembershipPatch, RoomKind, RoomSummary};
use crate::error::{AppError, Result};
use crate::services::notification_service::NotificationService;
use sqlx::PgConnection;
use uuid::Uuid;

const MAX_GROUP_NAME_LENGTH: usize = 100;

/// Loads the caller's membership, failing with 403 when they are not in the room.
pub(crate) async fn require_membership(
    rooms: &RoomRepository,
    conn: &mut PgConnection,
    room_id: Uuid,
    user_id: Uuid,
) -> Result<Membership> {
    rooms
        .find_membership(conn, room_id, user_id)
        .await?
        .ok_or_else(|| AppError::Forbidden("Not a member of this room".into()))
}

#[derive(Clone, Debug)]
pub struct RoomService {
    pool: DbPool,
    repo: RoomRepository,
    users: UserRepository,
    notifier: NotificationService,
}

impl RoomService {
    #[must_use]
    pub const fn new(pool: DbPool, repo: RoomRepository, users: UserRepository, notifier: NotificationService) -> Self {
        Self { pool, repo, users, notifier }
    }

    /// # Errors
    /// Returns `AppError::Database` if the rooms cannot be loaded.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn list(&self, user_id: Uuid, include_hidden: bool) -> Result<Vec<RoomSummary>> {
        let mut conn = self.pool.acquire().await?;
        self.repo.list_summaries(&mut conn, user_id, include_hidden).await
    }

    /// Room ids the user belongs to. The gateway subscribes to these on connect.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    pub async fn room_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let mut conn = self.pool.acquire().await?;
        self.repo.room_ids_for_user(&mut conn, user_id).await
    }

    /// # Errors
    /// Returns `AppError::Forbidden` if the user is not a member.
    pub async fn ensure_member(&self, room_id: Uuid, user_id: Uuid) -> Result<Membership> {
        let mut conn = self.pool.acquire().await?;
        require_membership(&self.repo, &mut conn, room_id, user_id).await
    }

    /// Returns the direct room shared by the two users, creating it on first use.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` when both ids are the same user.
    /// Returns `AppError::NotFound` if the other user does not exist.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn create_direct(&self, user_id: Uuid, other_id: Uuid) -> Result<RoomSummary> {
        if user_id == other_id {
            return Err(AppError::BadRequest("Cannot open a direct room with yourself".into()));
        }

        let mut tx = self.pool.begin().await?;
        if self.users.find_by_id(&mut tx, other_id).await?.is_none() {
            return Err(AppError::NotFound);
        }

        self.repo.lock_direct_pair(&mut tx, user_id, other_id).await?;

        let room = if let Some(room) = self.repo.find_direct(&mut tx, user_id, other_id).await? {
            room
        } else {
            let room = self.repo.create(&mut tx, RoomKind::Direct, None, user_id).await?;
            self.repo.add_member(&mut tx, room.id, user_id, MemberRole::Member).await?;
            self.repo.add_member(&mut tx, room.id, other_id, MemberRole::Member).await?;
            tracing::info!(room_id = %room.id, "Direct room created");
            room
        };

        let summary = self.repo.find_summary(&mut tx, room.id, user_id).await?.ok_or(AppError::Internal)?;
        tx.commit().await?;
        Ok(summary)
    }

    /// Creates a group owned by the caller with the given members.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the name is blank or too long.
    /// Returns `AppError::NotFound` if any member does not exist.
    #[tracing::instrument(err(level = "warn"), skip(self, name, member_ids), fields(members = member_ids.len()))]
    pub async fn create_group(&self, user_id: Uuid, name: &str, member_ids: &[Uuid]) -> Result<RoomSummary> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_GROUP_NAME_LENGTH {
            return Err(AppError::BadRequest(format!(
                "Group name must be between 1 and {MAX_GROUP_NAME_LENGTH} characters"
            )));
        }

        let mut members: Vec<Uuid> = member_ids.iter().copied().filter(|id| *id != user_id).collect();
        members.sort_unstable();
        members.dedup();

        let mut tx = self.pool.begin().await?;
        if self.users.count_existing(&mut tx, &members).await? != i64::try_from(members.len()).unwrap_or(i64::MAX) {
            return Err(AppError::NotFound);
        }

        let room = self.repo.create(&mut tx, RoomKind::Group, Some(name), user_id).await?;
        self.repo.add_member(&mut tx, room.id, user_id, MemberRole::Owner).await?;
        for member in &members {
            self.repo.add_member(&mut tx, room.id, *member, MemberRole::Member).await?;
        }
        let summary = self.repo.find_summary(&mut tx, room.id, user_id).await?.ok_or(AppError::Internal)?;
        tx.commit().await?;

        tracing::info!(room_id = %room.id, "Group created");
        let event = ServerEvent::GroupCreated { room, member_ids: summary.member_ids.clone() };
        self.notifier.notify_users(&summary.member_ids, &event).await;

        Ok(summary)
    }

    /// # Errors
    /// Returns `AppError::Forbidden` unless the actor is an owner or admin of the group.
    /// Returns `AppError::Conflict` if the user is already a member.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn add_member(&self, actor_id: Uuid, room_id: Uuid, user_id: Uuid) -> Result<RoomSummary> {
        let mut conn = self.pool.acquire().await?;
        let membership = require_membership(&self.repo, &mut conn, room_id, actor_id).await?;
        let summary = self.repo.find_summary(&mut conn, room_id, actor_id).await?.ok_or(AppError::NotFound)?;

        if summary.room.kind != RoomKind::Group {
            return Err(AppError::BadRequest("Members can only be added to groups".into()));
        }
        if !membership.role.can_manage_members() {
            return Err(AppError::Forbidden("Only owners and admins can add members".into()));
        }
        if !self.repo.add_member(&mut conn, room_id, user_id, MemberRole::Member).await? {
            return Err(AppError::Conflict("User is already a member".into()));
        }

        let summary = self.repo.find_summary(&mut conn, room_id, actor_id).await?.ok_or(AppError::Internal)?;
        drop(conn);

        let event = ServerEvent::GroupMemberAdded { room_id, user_id, added_by: actor_id };
        self.notifier.notify(EventTarget::Room(room_id), event.clone()).await;
        self.notifier.notify(EventTarget::User(user_id), event).await;

        Ok(summary)
    }

    /// Removes a member. Anyone may leave; removing someone else needs owner or admin rights,
    /// and the owner can only leave on their own.
    ///
    /// # Errors
    /// Returns `AppError::Forbidden` if the actor may not remove this member.
    /// Returns `AppError::NotFound` if the user is not a member.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn remove_member(&self, actor_id: Uuid, room_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        let membership = require_membership(&self.repo, &mut conn, room_id, actor_id).await?;
        let summary = self.repo.find_summary(&mut conn, room_id, actor_id).await?.ok_or(AppError::NotFound)?;

        if summary.room.kind != RoomKind::Group {
            return Err(AppError::BadRequest("Members can only be removed from groups".into()));
        }

        if actor_id != user_id {
            if !membership.role.can_manage_members() {
                return Err(AppError::Forbidden("Only owners and admins can remove members".into()));
            }
            let target = self.repo.find_membership(&mut conn, room_id, user_id).await?.ok_or(AppError::NotFound)?;
            if target.role == MemberRole::Owner {
                return Err(AppError::Forbidden("The owner cannot be removed".into()));
            }
        }

        if !self.repo.remove_member(&mut conn, room_id, user_id).await? {
            return Err(AppError::NotFound);
        }
        drop(conn);

        let event = ServerEvent::GroupMemberRemoved { room_id, user_id, removed_by: actor_id };
        self.notifier.notify(EventTarget::Room(room_id), event.clone()).await;
        self.notifier.notify(EventTarget::User(user_id), event).await;

        Ok(())
    }

    /// # Errors
    /// Returns `AppError::BadRequest` for an empty patch.
    /// Returns `AppError::Forbidden` if the user is not a member.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn update_membership(&self, user_id: Uuid, room_id: Uuid, patch: MembershipPatch) -> Result<RoomSummary> {
        if patch.is_empty() {
            return Err(AppError::BadRequest("No membership flags provided".into()));
        }

        let mut conn = self.pool.acquire().await?;
        require_membership(&self.repo, &mut conn, room_id, user_id).await?;
        self.repo.update_flags(&mut conn, room_id, user_id, patch).await?;
        let summary = self.repo.find_summary(&mut conn, room_id, user_id).await?.ok_or(AppError::NotFound)?;
        drop(conn);

        self.notifier.notify(EventTarget::User(user_id), ServerEvent::RoomUpdated(summary.clone())).await;
        Ok(summary)
    }

    /// Hides the current history of a room from the caller only.
    ///
    /// # Errors
    /// Returns `AppError::Forbidden` if the user is not a member.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn clear(&self, user_id: Uuid, room_id: Uuid) -> Result<RoomSummary> {
        let mut conn = self.pool.acquire().await?;
        require_membership(&self.repo, &mut conn, room_id, user_id).await?;
        self.repo.clear(&mut conn, room_id, user_id).await?;
        let summary = self.repo.find_summary(&mut conn, room_id, user_id).await?.ok_or(AppError::NotFound)?;
        drop(conn);

        self.notifier.notify(EventTarget::User(user_id), ServerEvent::RoomUpdated(summary.clone())).await;
        Ok(summary)
    }

    /// Tells each user their room came back into view.
    pub(crate) async fn announce_unhidden(&self, room_id: Uuid, user_ids: &[Uuid]) {
        if user_ids.is_empty() {
            return;
        }
        let Ok(mut conn) = self.pool.acquire().await else {
            tracing::warn!("Could not announce unhidden room");
            return;
        };
        for user_id in user_ids {
            match self.repo.find_summary(&mut conn, room_id, *user_id).await {
                Ok(Some(summary)) => {
                    self.notifier.notify(EventTarget::User(*user_id), ServerEvent::RoomUpdated(summary)).await;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Failed to load room summary"),
            }
        }
    }
}
