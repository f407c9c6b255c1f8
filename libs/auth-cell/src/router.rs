use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{get, post};
use axum::{middleware, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn auth_routes<S>(state: S) -> Router
where
    S: Clone + Send + Sync + 'static,
    Arc<AppConfig>: FromRef<S>,
{
    let config = Arc::<AppConfig>::from_ref(&state);

    let public_routes = Router::new().route("/auth/login", post(handlers::login));

    let protected_routes = Router::new()
        .route("/auth/validate", get(handlers::validate))
        .route("/auth/logout", post(handlers::logout))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
