use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::messages::{HistoryQuery, MarkReadResponse};
use crate::api::schemas::rooms::{
    AddMemberRequest, CreateDirectRequest, CreateGroupRequest, ListRoomsQuery, UpdateMembershipRequest,
};
use crate::domain::message::MessageView;
use crate::domain::room::RoomSummary;
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Lists the caller's rooms, pinned first, then by latest activity.
///
/// # Errors
/// Returns `AppError::Database` if the rooms cannot be loaded.
pub async fn list_rooms(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListRoomsQuery>,
) -> Result<Json<Vec<RoomSummary>>> {
    Ok(Json(state.room_service.list(auth_user.user_id, query.include_hidden).await?))
}

/// Returns the direct room with another user, creating it on first contact.
///
/// # Errors
/// Returns `AppError::BadRequest` for a room with oneself.
/// Returns `AppError::NotFound` if the other user does not exist.
pub async fn create_direct(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateDirectRequest>,
) -> Result<Json<RoomSummary>> {
    Ok(Json(state.room_service.create_direct(auth_user.user_id, payload.user_id).await?))
}

/// # Errors
/// Returns `AppError::BadRequest` if the name is blank or too long.
/// Returns `AppError::NotFound` if any member does not exist.
pub async fn create_group(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse> {
    let summary = state.room_service.create_group(auth_user.user_id, &payload.name, &payload.member_ids).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Pages backwards through a room, newest first.
///
/// # Errors
/// Returns `AppError::Forbidden` if the caller is not a member.
/// Returns `AppError::BadRequest` if the cursor does not name a message in the room.
pub async fn history(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageView>>> {
    Ok(Json(state.message_service.history(auth_user.user_id, room_id, query.before, query.limit).await?))
}

/// # Errors
/// Returns `AppError::BadRequest` if no flag is set.
/// Returns `AppError::Forbidden` if the caller is not a member.
pub async fn update_membership(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(payload): Json<UpdateMembershipRequest>,
) -> Result<Json<RoomSummary>> {
    Ok(Json(state.room_service.update_membership(auth_user.user_id, room_id, payload.into()).await?))
}

/// Hides everything sent before now from the caller.
///
/// # Errors
/// Returns `AppError::Forbidden` if the caller is not a member.
pub async fn clear_room(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomSummary>> {
    Ok(Json(state.room_service.clear(auth_user.user_id, room_id).await?))
}

/// # Errors
/// Returns `AppError::Forbidden` if the caller is not a member.
pub async fn mark_read(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<MarkReadResponse>> {
    let marked = state.receipt_service.mark_room_read(auth_user.user_id, room_id).await?;
    Ok(Json(MarkReadResponse { marked }))
}

/// # Errors
/// Returns `AppError::Forbidden` unless the caller owns or administers the group.
/// Returns `AppError::Conflict` if the user is already a member.
pub async fn add_member(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(payload): Json<AddMemberRequest>,
) -> Result<Json<RoomSummary>> {
    Ok(Json(state.room_service.add_member(auth_user.user_id, room_id, payload.user_id).await?))
}

/// Removes a member, or lets the caller leave when they name themselves.
///
/// # Errors
/// Returns `AppError::Forbidden` if the caller may not remove that member.
pub async fn remove_member(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((room_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    state.room_service.remove_member(auth_user.user_id, room_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
