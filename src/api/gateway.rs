use crate::api::AppState;
use axum::{
    extract::{Query, State, ws::WebSocketUpgrade},
    http::{Extensions, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use tower_http::request_id::RequestId;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: String,
}

/// Upgrades to the event socket. Browsers cannot set headers on a WebSocket handshake,
/// so the session token travels in the query string.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    extensions: Extensions,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let request_id = extensions
        .get::<RequestId>()
        .map(|id| id.header_value().to_str().unwrap_or_default().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match state.session_service.authenticate(&params.token).await {
        Ok(principal) => {
            let gateway = state.gateway_service.clone();
            let shutdown_rx = state.shutdown_rx.clone();
            ws.on_upgrade(move |socket| async move {
                gateway.handle_socket(socket, principal, request_id, shutdown_rx).await;
            })
        }
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket handshake failed");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}
