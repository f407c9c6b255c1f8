use std::sync::Arc;

use axum::body::Body;
use axum::extract::FromRef;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::router::appointment_routes;
use notification_cell::{NotificationDispatcher, ReminderScheduler};
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

#[derive(Clone)]
struct AppState {
    config: Arc<AppConfig>,
    reminders: Arc<ReminderScheduler>,
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<ReminderScheduler> {
    fn from_ref(state: &AppState) -> Self {
        state.reminders.clone()
    }
}

fn app(config: AppConfig) -> Router {
    appointment_routes(AppState {
        config: Arc::new(config),
        reminders: Arc::new(ReminderScheduler::new(NotificationDispatcher::new())),
    })
}

async fn mock_lock_and_release(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "lock_key": "whatever", "acquired_at": Utc::now().to_rfc3339()
        }])))
        .mount(mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn book_appointment_succeeds_when_slot_is_free() {
    let mock_server = MockServer::start().await;
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = mock_server.uri();

    let doctor_id = Uuid::new_v4();
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let start = Utc::now() + Duration::days(1);

    mock_lock_and_release(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_response(doctor_id, Uuid::new_v4(), "Dr. Test")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                Uuid::new_v4(),
                &user.id,
                doctor_id,
                &start.to_rfc3339(),
                &(start + Duration::minutes(30)).to_rfc3339(),
            )
        ])))
        .mount(&mock_server)
        .await;

    let app = app(config);
    let body = json!({
        "doctor_id": doctor_id,
        "appointment_time": start.to_rfc3339(),
        "duration_minutes": 30,
    });

    let request = Request::builder()
        .method("POST")
        .uri("/appointments/book")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json_response: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json_response["success"], true);
    assert_eq!(json_response["appointment"]["doctor_id"], doctor_id.to_string());
}

#[tokio::test]
async fn book_appointment_reports_conflict_with_alternatives() {
    let mock_server = MockServer::start().await;
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = mock_server.uri();

    let doctor_id = Uuid::new_v4();
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let start = Utc::now() + Duration::days(1);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_response(doctor_id, Uuid::new_v4(), "Dr. Test")
        ])))
        .mount(&mock_server)
        .await;

    let existing_id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                existing_id,
                &Uuid::new_v4().to_string(),
                doctor_id,
                &start.to_rfc3339(),
                &(start + Duration::minutes(30)).to_rfc3339(),
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let app = app(config);
    let body = json!({
        "doctor_id": doctor_id,
        "appointment_time": start.to_rfc3339(),
        "duration_minutes": 30,
    });

    let request = Request::builder()
        .method("POST")
        .uri("/appointments/book")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json_response: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json_response["success"], false);
    assert!(json_response["alternatives"].is_array());
}

#[tokio::test]
async fn book_appointment_rejects_past_start_time() {
    let config = TestConfig::default().to_app_config();
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let app = app(config);

    let body = json!({
        "doctor_id": Uuid::new_v4(),
        "appointment_time": (Utc::now() - Duration::days(1)).to_rfc3339(),
        "duration_minutes": 30,
    });

    let request = Request::builder()
        .method("POST")
        .uri("/appointments/book")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn book_appointment_requires_authentication() {
    let config = TestConfig::default().to_app_config();
    let app = app(config);

    let body = json!({
        "doctor_id": Uuid::new_v4(),
        "appointment_time": (Utc::now() + Duration::days(1)).to_rfc3339(),
        "duration_minutes": 30,
    });

    let request = Request::builder()
        .method("POST")
        .uri("/appointments/book")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn check_availability_is_public_and_reports_free_slot() {
    let mock_server = MockServer::start().await;
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = mock_server.uri();
    let doctor_id = Uuid::new_v4();
    let start = Utc::now() + Duration::days(1);
    let end = start + Duration::minutes(30);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let app = app(config);
    let uri = format!(
        "/appointments/check-availability?doctor_id={}&start_time={}&end_time={}",
        doctor_id,
        urlencoding::encode(&start.to_rfc3339()),
        urlencoding::encode(&end.to_rfc3339())
    );

    let request = Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json_response: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json_response["available"], true);
}

#[tokio::test]
async fn list_patient_appointments_requires_authentication() {
    let config = TestConfig::default().to_app_config();
    let app = app(config);

    let request = Request::builder()
        .method("GET")
        .uri("/appointments/patient")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
