use crate::api::rate_limit::{ClientIpExtractor, RateLimitMetrics, log_rate_limit_events};
use crate::config::Config;
use crate::services::gateway::GatewayService;
use crate::services::health_service::HealthService;
use crate::services::message_service::MessageService;
use crate::services::presence_service::PresenceService;
use crate::services::receipt_service::ReceiptService;
use crate::services::room_service::RoomService;
use crate::services::session_service::SessionService;
use crate::services::user_service::UserService;
use axum::body::Body;
use axum::http::{HeaderName, Request};
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post, put},
};
use std::sync::Arc;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod gateway;
pub mod health;
pub mod messages;
pub mod middleware;
pub mod rate_limit;
pub mod rooms;
pub mod schemas;
pub mod sessions;
pub mod users;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Config,
    pub message_service: MessageService,
    pub receipt_service: ReceiptService,
    pub room_service: RoomService,
    pub session_service: SessionService,
    pub user_service: UserService,
    pub presence_service: PresenceService,
    pub gateway_service: GatewayService,
    pub rate_limit_metrics: RateLimitMetrics,
    pub shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Clone, Debug)]
pub struct MgmtState {
    pub health_service: HealthService,
}

#[derive(Debug)]
pub struct ServiceContainer {
    pub message_service: MessageService,
    pub receipt_service: ReceiptService,
    pub room_service: RoomService,
    pub session_service: SessionService,
    pub user_service: UserService,
    pub presence_service: PresenceService,
    pub gateway_service: GatewayService,
}

/// Configures and returns the public API router.
///
/// # Panics
/// Panics if the rate limiter configuration cannot be constructed.
pub fn app_router(
    config: Config,
    services: ServiceContainer,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> Router {
    let interval_ns = 1_000_000_000 / config.rate_limit.per_second.max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_nanosecond(u64::from(interval_ns))
            .burst_size(config.rate_limit.burst.max(1))
            .key_extractor(ClientIpExtractor::new(&config.server.trusted_proxies))
            .finish()
            .expect("Failed to build rate limiter config"),
    );

    let state = AppState {
        config,
        message_service: services.message_service,
        receipt_service: services.receipt_service,
        room_service: services.room_service,
        session_service: services.session_service,
        user_service: services.user_service,
        presence_service: services.presence_service,
        gateway_service: services.gateway_service,
        rate_limit_metrics: RateLimitMetrics::new(),
        shutdown_rx,
    };

    let message_routes = Router::new()
        .route("/messages", post(messages::send_message))
        .route("/messages/audio", post(messages::send_audio))
        .route("/messages/{id}", get(messages::get_message))
        .route("/messages/{id}/edit", put(messages::edit_message))
        .route("/messages/{id}/for-me", delete(messages::delete_for_me))
        .route("/messages/{id}/for-everyone", delete(messages::delete_for_everyone))
        .route("/messages/{id}/delivered", post(messages::mark_delivered))
        .route("/messages/{id}/read", post(messages::mark_read))
        .route("/messages/{id}/viewed", post(messages::mark_viewed))
        .route("/messages/{id}/audio-heard", post(messages::mark_heard));

    let room_routes = Router::new()
        .route("/rooms", get(rooms::list_rooms))
        .route("/rooms/direct", post(rooms::create_direct))
        .route("/rooms/group", post(rooms::create_group))
        .route("/rooms/{id}/messages", get(rooms::history))
        .route("/rooms/{id}/membership", patch(rooms::update_membership))
        .route("/rooms/{id}/clear", post(rooms::clear_room))
        .route("/rooms/{id}/read", post(rooms::mark_read))
        .route("/rooms/{id}/members", post(rooms::add_member))
        .route("/rooms/{id}/members/{userId}", delete(rooms::remove_member));

    let account_routes = Router::new()
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/revoke-others", post(sessions::revoke_others))
        .route("/sessions/{id}", delete(sessions::revoke))
        .route("/users/me/avatar", put(users::set_avatar).delete(users::delete_avatar))
        .route("/users/{id}/presence", get(users::presence))
        .route("/socket", get(gateway::websocket_handler));

    let api_routes =
        message_routes.merge(room_routes).merge(account_routes).layer(GovernorLayer::new(governor_conf));

    Router::new()
        .nest("/api", api_routes)
        .layer(from_fn_with_state(state.clone(), log_rate_limit_events))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER)))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<RequestId>()
                        .and_then(|id| id.header_value().to_str().ok())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                        "user_id" = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        let status = response.status();
                        span.record("http.response.status_code", status.as_u16());

                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %status.as_u16(),
                            "request completed"
                        );
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER), middleware::MakeRequestUuidV7))
        .with_state(state)
}

pub fn mgmt_router(state: MgmtState) -> Router {
    Router::new().route("/livez", get(health::livez)).route("/readyz", get(health::readyz)).with_state(state)
}
