use crate::adapters::database::DbPool;
use crate::adapters::database::session_repo::SessionRepository;
use crate::config::AuthConfig;
use crate::domain::auth::Claims;
use crate::domain::notification::{EventTarget, ServerEvent};
use crate::domain::session::SessionView;
use crate::error::{AppError, Result};
use crate::services::notification_service::NotificationService;
use uuid::Uuid;

/// The identity behind an authenticated request or socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

#[derive(Clone, Debug)]
pub struct SessionService {
    pool: DbPool,
    repo: SessionRepository,
    notifier: NotificationService,
    config: AuthConfig,
}

impl SessionService {
    #[must_use]
    pub const fn new(pool: DbPool, repo: SessionRepository, notifier: NotificationService, config: AuthConfig) -> Self {
        Self { pool, repo, notifier, config }
    }

    /// Verifies a token and that its session is still live, refreshing the session's activity.
    ///
    /// # Errors
    /// Returns `AppError::AuthError` if the token is invalid or the session was revoked.
    #[tracing::instrument(level = "debug", err(level = "debug"), skip_all)]
    pub async fn authenticate(&self, token: &str) -> Result<Principal> {
        let claims = Claims::decode(token, &self.config.jwt_secret)?;

        let mut conn = self.pool.acquire().await?;
        match self.repo.touch(&mut conn, claims.sid, claims.sub).await? {
            Some(session) => Ok(Principal { user_id: session.user_id, session_id: session.id }),
            None => Err(AppError::AuthError),
        }
    }

    /// # Errors
    /// Returns `AppError::Database` if the sessions cannot be loaded.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn list(&self, principal: Principal) -> Result<Vec<SessionView>> {
        let mut conn = self.pool.acquire().await?;
        let sessions = self.repo.list(&mut conn, principal.user_id).await?;
        Ok(sessions.into_iter().map(|s| s.into_view(principal.session_id)).collect())
    }

    /// Signs out one device.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the session does not belong to the user.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn revoke(&self, principal: Principal, session_id: Uuid) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        if !self.repo.delete(&mut conn, session_id, principal.user_id).await? {
            return Err(AppError::NotFound);
        }
        drop(conn);

        tracing::info!(%session_id, "Session revoked");
        self.notifier.notify(EventTarget::User(principal.user_id), ServerEvent::SessionRevoked { session_id }).await;
        Ok(())
    }

    /// Signs out every device except the caller's. Returns how many sessions ended.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the sessions cannot be deleted.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn revoke_others(&self, principal: Principal) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        let revoked = self.repo.delete_others(&mut conn, principal.user_id, principal.session_id).await?;
        drop(conn);

        let count = revoked.len() as u64;
        tracing::info!(revoked = count, "Other sessions revoked");
        self.notifier
            .notify(
                EventTarget::User(principal.user_id),
                ServerEvent::SessionsRevokedOthers { kept_session_id: principal.session_id, revoked: count },
            )
            .await;
        Ok(count)
    }
}
