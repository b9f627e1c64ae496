use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::users::AvatarRequest;
use crate::domain::presence::PresenceStatus;
use crate::domain::user::User;
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

/// # Errors
/// Returns `AppError::BadRequest` if the URL is blank or too long.
pub async fn set_avatar(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<AvatarRequest>,
) -> Result<Json<User>> {
    Ok(Json(state.user_service.set_avatar(auth_user.user_id, &payload.avatar_url).await?))
}

/// # Errors
/// Returns `AppError::NotFound` if the caller no longer exists.
pub async fn delete_avatar(auth_user: AuthUser, State(state): State<AppState>) -> Result<Json<User>> {
    Ok(Json(state.user_service.delete_avatar(auth_user.user_id).await?))
}

/// # Errors
/// Returns `AppError::NotFound` if the user does not exist.
pub async fn presence(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<PresenceStatus>> {
    state.user_service.get(user_id).await?;
    Ok(Json(state.presence_service.status(user_id)))
}
