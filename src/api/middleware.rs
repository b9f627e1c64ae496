use crate::api::AppState;
use crate::error::AppError;
use crate::services::session_service::Principal;
use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, Request, header, request::Parts},
};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// The caller of an authenticated route. Extraction fails with 401 unless the bearer token
/// verifies and its session row still exists.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

impl From<AuthUser> for Principal {
    fn from(user: AuthUser) -> Self {
        Self { user_id: user.user_id, session_id: user.session_id }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts.headers.get(header::AUTHORIZATION).ok_or(AppError::AuthError)?;

        let auth_str = auth_header.to_str().map_err(|_| AppError::AuthError)?;
        let token = auth_str.strip_prefix("Bearer ").ok_or(AppError::AuthError)?;

        let principal = state.session_service.authenticate(token).await?;
        tracing::Span::current().record("user_id", tracing::field::display(principal.user_id));

        Ok(Self { user_id: principal.user_id, session_id: principal.session_id })
    }
}

/// Tags requests that arrive without an `x-request-id` with a time-ordered UUID.
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::now_v7().to_string()).ok().map(RequestId::new)
    }
}
