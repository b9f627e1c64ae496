use crate::api::MgmtState;
use crate::api::schemas::health::HealthResponse;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// Liveness probe: returns 200 OK as long as the server is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: checks the database and, when configured, the pub/sub bus.
pub async fn readyz(State(state): State<MgmtState>) -> impl IntoResponse {
    let (db_res, pubsub_res) = tokio::join!(state.health_service.check_db(), state.health_service.check_pubsub());

    let mut status_code = StatusCode::OK;
    let mut component_status = |component: &str, res: Result<(), String>| {
        if let Err(e) = res {
            tracing::warn!(error = %e, component, "Readiness probe failed");
            status_code = StatusCode::SERVICE_UNAVAILABLE;
            "error"
        } else {
            "ok"
        }
    };

    let database = component_status("database", db_res).to_string();
    let pubsub = component_status("pubsub", pubsub_res).to_string();

    let response = HealthResponse {
        status: if status_code == StatusCode::OK { "ok" } else { "error" }.to_string(),
        database,
        pubsub,
    };

    (status_code, Json(response))
}
