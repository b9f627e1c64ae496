use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::messages::EditMessageRequest;
use crate::domain::message::{MessageView, NewAudioMessage, NewMessage};
use crate::domain::receipt::ReceiptKind;
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Sends a message into a room the caller belongs to.
///
/// # Errors
/// Returns `AppError::BadRequest` if the payload is invalid for its type.
/// Returns `AppError::Forbidden` if the caller is not a member of the room.
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<NewMessage>,
) -> Result<impl IntoResponse> {
    let view = state.message_service.send(auth_user.user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Sends a voice note.
///
/// # Errors
/// Returns `AppError::BadRequest` if the duration or media reference is invalid.
/// Returns `AppError::Forbidden` if the caller is not a member of the room.
pub async fn send_audio(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<NewAudioMessage>,
) -> Result<impl IntoResponse> {
    let view = state.message_service.send(auth_user.user_id, payload.into()).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// # Errors
/// Returns `AppError::NotFound` if the message is gone or hidden from the caller.
pub async fn get_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageView>> {
    Ok(Json(state.message_service.get(auth_user.user_id, message_id).await?))
}

/// Replaces the text of one of the caller's own messages.
///
/// # Errors
/// Returns `AppError::Forbidden` if the caller did not send the message.
/// Returns `AppError::BadRequest` if the message is not text or the content is invalid.
pub async fn edit_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Json(payload): Json<EditMessageRequest>,
) -> Result<Json<MessageView>> {
    Ok(Json(state.message_service.edit(auth_user.user_id, message_id, &payload.content).await?))
}

/// # Errors
/// Returns `AppError::Forbidden` if the caller is not a member of the room.
pub async fn delete_for_me(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.message_service.delete_for_me(auth_user.user_id, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// # Errors
/// Returns `AppError::Forbidden` if the caller did not send the message.
pub async fn delete_for_everyone(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.message_service.delete_for_everyone(auth_user.user_id, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn acknowledge(
    state: &AppState,
    auth_user: AuthUser,
    message_id: Uuid,
    kind: ReceiptKind,
) -> Result<Json<MessageView>> {
    Ok(Json(state.receipt_service.acknowledge(auth_user.user_id, message_id, kind).await?))
}

/// # Errors
/// Returns `AppError::Forbidden` if the caller is not a member of the room.
pub async fn mark_delivered(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageView>> {
    acknowledge(&state, auth_user, message_id, ReceiptKind::Delivered).await
}

/// # Errors
/// Returns `AppError::Forbidden` if the caller is not a member of the room.
pub async fn mark_read(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageView>> {
    acknowledge(&state, auth_user, message_id, ReceiptKind::Read).await
}

/// Opens a view-once message. The response already carries the opened placeholder.
///
/// # Errors
/// Returns `AppError::BadRequest` if the message is not view-once.
pub async fn mark_viewed(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageView>> {
    acknowledge(&state, auth_user, message_id, ReceiptKind::Viewed).await
}

/// # Errors
/// Returns `AppError::BadRequest` if the message is not a voice note.
pub async fn mark_heard(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageView>> {
    acknowledge(&state, auth_user, message_id, ReceiptKind::Heard).await
}
