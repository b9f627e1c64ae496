use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::sessions::RevokeOthersResponse;
use crate::domain::session::SessionView;
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// # Errors
/// Returns `AppError::Database` if the sessions cannot be loaded.
pub async fn list_sessions(auth_user: AuthUser, State(state): State<AppState>) -> Result<Json<Vec<SessionView>>> {
    Ok(Json(state.session_service.list(auth_user.into()).await?))
}

/// Signs out one of the caller's devices.
///
/// # Errors
/// Returns `AppError::NotFound` if the session is not the caller's.
pub async fn revoke(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.session_service.revoke(auth_user.into(), session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Signs out every device except the one making the request.
///
/// # Errors
/// Returns `AppError::Database` if the sessions cannot be deleted.
pub async fn revoke_others(auth_user: AuthUser, State(state): State<AppState>) -> Result<Json<RevokeOthersResponse>> {
    let revoked = state.session_service.revoke_others(auth_user.into()).await?;
    Ok(Json(RevokeOthersResponse { revoked }))
}
