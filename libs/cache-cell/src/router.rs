use std::sync::Arc;

use axum::extract::FromRef;
use axum::middleware;
use axum::routing::get;
use axum::Router;

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::CacheService;

/// `/cache/health` requires a bearer token like the rest of `/api/v1` - only `/health` and
/// `POST /auth/login` are carved out as public.
pub fn cache_routes<S>(state: S) -> Router
where
    S: Clone + Send + Sync + 'static,
    Arc<AppConfig>: FromRef<S>,
    Arc<CacheService>: FromRef<S>,
{
    let config = Arc::<AppConfig>::from_ref(&state);

    Router::new()
        .route("/cache/health", get(handlers::cache_health))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
