use crate::adapters::database::DbPool;
use crate::adapters::database::user_repo::UserRepository;
use crate::domain::notification::{EventTarget, ServerEvent};
use crate::domain::user::User;
use crate::error::{AppError, Result};
use crate::services::notification_service::NotificationService;
use uuid::Uuid;

const MAX_AVATAR_URL_LENGTH: usize = 2048;

#[derive(Clone, Debug)]
pub struct UserService {
    pool: DbPool,
    repo: UserRepository,
    notifier: NotificationService,
}

impl UserService {
    #[must_use]
    pub const fn new(pool: DbPool, repo: UserRepository, notifier: NotificationService) -> Self {
        Self { pool, repo, notifier }
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the user does not exist.
    pub async fn get(&self, user_id: Uuid) -> Result<User> {
        let mut conn = self.pool.acquire().await?;
        self.repo.find_by_id(&mut conn, user_id).await?.ok_or(AppError::NotFound)
    }

    /// # Errors
    /// Returns `AppError::BadRequest` if the URL is blank or too long.
    #[tracing::instrument(err(level = "warn"), skip(self, avatar_url))]
    pub async fn set_avatar(&self, user_id: Uuid, avatar_url: &str) -> Result<User> {
        let avatar_url = avatar_url.trim();
        if avatar_url.is_empty() || avatar_url.len() > MAX_AVATAR_URL_LENGTH {
            return Err(AppError::BadRequest("avatar_url must be a non-empty URL".into()));
        }

        let mut conn = self.pool.acquire().await?;
        let user = self.repo.set_avatar(&mut conn, user_id, Some(avatar_url)).await?.ok_or(AppError::NotFound)?;
        drop(conn);

        let event = ServerEvent::AvatarUpdated { user_id, avatar_url: avatar_url.to_string() };
        self.notifier.notify(EventTarget::Global, event).await;
        Ok(user)
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the user does not exist.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn delete_avatar(&self, user_id: Uuid) -> Result<User> {
        let mut conn = self.pool.acquire().await?;
        let user = self.repo.set_avatar(&mut conn, user_id, None).await?.ok_or(AppError::NotFound)?;
        drop(conn);

        self.notifier.notify(EventTarget::Global, ServerEvent::AvatarDeleted { user_id }).await;
        Ok(user)
    }
}
