use axum::extract::FromRef;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;
use std::sync::Arc;

use cache_cell::CacheService;

use crate::handlers;

/// Routes for the catalog (specialties/doctors) and the slot generator. Generic over the
/// application's composite state type so `apps/api` can share one `AppState` across every cell,
/// the same way the teacher's cells each took `Arc<AppConfig>` directly but generalized to a
/// second piece of substate (the cache) via axum's `FromRef`. Every route requires a valid
/// bearer token, same as the rest of the `/api/v1` surface outside `/health` and `/auth/login`.
pub fn doctor_routes<S>(state: S) -> Router
where
    S: Clone + Send + Sync + 'static,
    Arc<AppConfig>: FromRef<S>,
    Arc<CacheService>: FromRef<S>,
{
    let config = Arc::<AppConfig>::from_ref(&state);

    Router::new()
        .route("/specialties", post(handlers::create_specialty))
        .route("/specialties", get(handlers::list_specialties))
        .route("/doctors", post(handlers::create_doctor))
        .route("/doctors", get(handlers::list_doctors))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor))
        .route("/doctors/{doctor_id}", put(handlers::update_doctor))
        .route("/doctors/{doctor_id}", delete(handlers::delete_doctor))
        .route("/doctors/{doctor_id}/schedule", post(handlers::create_weekly_schedule))
        .route("/doctors/{doctor_id}/slots/generate-week", post(handlers::generate_week_slots))
        .route("/doctors/{doctor_id}/availability", get(handlers::get_availability))
        .route("/doctors/{doctor_id}/breaks", post(handlers::create_break))
        .route("/doctors/{doctor_id}/slots/block", post(handlers::block_slots))
        .route("/doctors/{doctor_id}/slots/unblock", post(handlers::unblock_slots))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
