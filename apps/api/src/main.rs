use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use cache_cell::CacheService;
use notification_cell::{NotificationDispatcher, ReminderScheduler};
use rate_cell::RateLimiter;
use router::AppState;
use shared_config::AppConfig;

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Amae Clinic API server");

    let config = AppConfig::from_env();

    let cors = build_cors(&config);
    let port = config.port;

    let rate_limiter = Arc::new(RateLimiter::new(&config));
    rate_limiter.clone().spawn_gc_task();

    let state = AppState {
        cache: Arc::new(CacheService::new(&config)),
        rate_limiter,
        reminders: Arc::new(ReminderScheduler::new(NotificationDispatcher::new())),
        config: Arc::new(config),
    };

    let app = axum::Router::new()
        .nest("/api/v1", router::create_router(state))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

/// Permissive by default (teacher's original `Any`/`Any`/`Any`); once `ALLOWED_ORIGINS` is set,
/// restrict to that explicit list instead, since `Any` origin is incompatible with the
/// credentialed requests the bearer-token flow expects browsers to send.
fn build_cors(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any);

    if config.allowed_origins.is_empty() {
        layer.allow_origin(tower_http::cors::Any)
    } else {
        let origins: Vec<_> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}
