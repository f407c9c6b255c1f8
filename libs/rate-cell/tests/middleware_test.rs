use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use tower::ServiceExt;

use rate_cell::{rate_limit_middleware, RateLimiter};
use shared_config::AppConfig;

fn config(rps: u32, burst: u32) -> AppConfig {
    AppConfig {
        supabase_url: String::new(),
        supabase_anon_key: String::new(),
        supabase_jwt_secret: String::new(),
        redis_addr: String::new(),
        redis_password: None,
        cache_default_ttl_secs: 900,
        rate_limit_enabled: true,
        rate_limit_rps: rps,
        rate_limit_burst: burst,
        allowed_origins: vec![],
        port: 8080,
        environment: "test".to_string(),
    }
}

fn app(limiter: Arc<RateLimiter>) -> Router {
    Router::new()
        .route("/api/v1/doctors", get(|| async { "ok" }))
        .layer(from_fn_with_state(limiter.clone(), rate_limit_middleware))
        .with_state(limiter)
}

#[tokio::test]
async fn third_request_in_a_burst_of_two_is_rejected_with_headers() {
    let limiter = Arc::new(RateLimiter::new(&config(1, 2)));
    let app = app(limiter);

    for _ in 0..2 {
        let request = Request::builder()
            .uri("/api/v1/doctors")
            .header("x-forwarded-for", "9.9.9.9")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let request = Request::builder()
        .uri("/api/v1/doctors")
        .header("x-forwarded-for", "9.9.9.9")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("x-ratelimit-limit"));
}
