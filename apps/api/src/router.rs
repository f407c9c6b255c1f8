use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::get;
use axum::{middleware, Json, Router};

use appointment_cell::router::appointment_routes;
use auth_cell::router::auth_routes;
use cache_cell::router::cache_routes;
use cache_cell::CacheService;
use doctor_cell::router::doctor_routes;
use notification_cell::ReminderScheduler;
use rate_cell::{rate_limit_middleware, RateLimiter};
use shared_config::AppConfig;

/// Composite application state. Each cell's router only demands the pieces of substate it
/// actually uses (`Arc<AppConfig>`, `Arc<CacheService>`, ...) via `FromRef`, the same way the
/// teacher's cells each took `Arc<AppConfig>` directly - this generalizes that to let several
/// cells share one `Router` and one `axum::serve` call.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub cache: Arc<CacheService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub reminders: Arc<ReminderScheduler>,
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<CacheService> {
    fn from_ref(state: &AppState) -> Self {
        state.cache.clone()
    }
}

impl FromRef<AppState> for Arc<RateLimiter> {
    fn from_ref(state: &AppState) -> Self {
        state.rate_limiter.clone()
    }
}

impl FromRef<AppState> for Arc<ReminderScheduler> {
    fn from_ref(state: &AppState) -> Self {
        state.reminders.clone()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "message": "Amae Clinic API is running" }))
}

pub fn create_router(state: AppState) -> Router {
    let rate_limiter = state.rate_limiter.clone();

    Router::new()
        .route("/health", get(health))
        .merge(auth_routes(state.clone()))
        .merge(doctor_routes(state.clone()))
        .merge(appointment_routes(state.clone()))
        .merge(cache_routes(state.clone()))
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware))
        .with_state(state)
}
