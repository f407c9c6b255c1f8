use std::sync::Arc;

use axum::body::Body;
use axum::extract::FromRef;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use cache_cell::router::cache_routes;
use cache_cell::CacheService;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, TestUser};

#[derive(Clone)]
struct TestState {
    config: Arc<AppConfig>,
    cache: Arc<CacheService>,
}

impl FromRef<TestState> for Arc<AppConfig> {
    fn from_ref(state: &TestState) -> Self {
        state.config.clone()
    }
}

impl FromRef<TestState> for Arc<CacheService> {
    fn from_ref(state: &TestState) -> Self {
        state.cache.clone()
    }
}

fn unconfigured_config() -> AppConfig {
    AppConfig {
        supabase_url: String::new(),
        supabase_anon_key: String::new(),
        supabase_jwt_secret: String::new(),
        redis_addr: String::new(),
        redis_password: None,
        cache_default_ttl_secs: 900,
        rate_limit_enabled: false,
        rate_limit_rps: 10,
        rate_limit_burst: 20,
        allowed_origins: vec![],
        port: 8080,
        environment: "test".to_string(),
    }
}

#[tokio::test]
async fn cache_health_endpoint_reports_unreachable_without_redis() {
    let config = Arc::new(unconfigured_config());
    let state = TestState {
        config: config.clone(),
        cache: Arc::new(CacheService::new(&config)),
    };
    let app = cache_routes(state);

    let user = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let request = Request::builder()
        .method("GET")
        .uri("/cache/health")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "unhealthy");
    assert_eq!(json["cache"], "disconnected");
}

#[tokio::test]
async fn get_put_invalidate_roundtrip_is_a_noop_without_redis() {
    let cache = CacheService::new(&unconfigured_config());

    cache.put("doctor:test", &"value").await;
    let got: Option<String> = cache.get("doctor:test").await;
    assert_eq!(got, None);

    cache.invalidate("doctor:test").await;
}
