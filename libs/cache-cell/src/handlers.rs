use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::services::CacheService;

/// `GET /cache/health`: 200 `{status:"healthy", cache:"connected"}` when Redis answers a PING,
/// 500 when it doesn't - this is the one endpoint that surfaces a cache outage as a failed
/// response rather than degrading silently, since its whole purpose is to report that state.
#[axum::debug_handler]
pub async fn cache_health(State(cache): State<Arc<CacheService>>) -> Response {
    let health = cache.health().await;
    if health.reachable {
        (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "cache": "connected" })),
        )
            .into_response()
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "unhealthy", "cache": "disconnected", "detail": health.detail })),
        )
            .into_response()
    }
}
