use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::handlers::{book_appointment, cancel_appointment, check_availability, CheckAvailabilityQuery};
use appointment_cell::models::{BookAppointmentRequest, CancelAppointmentRequest};
use chrono::{Duration, Utc};
use notification_cell::{NotificationDispatcher, ReminderScheduler};
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

fn user_extension(test_user: &TestUser) -> Extension<User> {
    Extension(test_user.to_user())
}

fn reminders() -> State<Arc<ReminderScheduler>> {
    State(Arc::new(ReminderScheduler::new(NotificationDispatcher::new())))
}

#[tokio::test]
async fn book_appointment_rejects_duration_outside_bounds() {
    let config = Arc::new(TestConfig::default().to_app_config());
    let user = TestUser::patient("patient@example.com");

    let req = BookAppointmentRequest {
        doctor_id: Uuid::new_v4(),
        appointment_time: Utc::now() + Duration::days(1),
        duration_minutes: 5,
        appointment_type: None,
        notes: None,
        reminder_type: None,
        reminder_lead_minutes: None,
    };

    let result = book_appointment(State(config), reminders(), user_extension(&user), axum::Json(req)).await;
    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::ValidationError(_) => {}
        other => panic!("expected ValidationError, got {:?}", other),
    }
}

#[tokio::test]
async fn book_appointment_surfaces_doctor_not_found() {
    let mock_server = MockServer::start().await;
    let mut cfg = TestConfig::default().to_app_config();
    cfg.supabase_url = mock_server.uri();
    let config = Arc::new(cfg);
    let user = TestUser::patient("patient@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let req = BookAppointmentRequest {
        doctor_id: Uuid::new_v4(),
        appointment_time: Utc::now() + Duration::days(1),
        duration_minutes: 30,
        appointment_type: None,
        notes: None,
        reminder_type: None,
        reminder_lead_minutes: None,
    };

    let result = book_appointment(State(config), reminders(), user_extension(&user), axum::Json(req)).await;
    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::NotFound(msg) => assert!(msg.contains("doctor")),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn cancel_appointment_reports_not_found() {
    let mock_server = MockServer::start().await;
    let mut cfg = TestConfig::default().to_app_config();
    cfg.supabase_url = mock_server.uri();
    let config = Arc::new(cfg);
    let user = TestUser::patient("patient@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let req = CancelAppointmentRequest { reason: "no longer needed".to_string() };
    let result = cancel_appointment(
        State(config),
        reminders(),
        user_extension(&user),
        Path(Uuid::new_v4()),
        axum::Json(req),
    )
    .await;

    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::NotFound(_) => {}
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn check_availability_rejects_inverted_interval() {
    let config = Arc::new(TestConfig::default().to_app_config());
    let start = Utc::now();
    let query = CheckAvailabilityQuery {
        doctor_id: Uuid::new_v4(),
        start_time: start,
        end_time: start - Duration::minutes(5),
    };

    let result = check_availability(State(config), Query(query)).await;
    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::ValidationError(_) => {}
        other => panic!("expected ValidationError, got {:?}", other),
    }
}

#[tokio::test]
async fn check_availability_reports_unavailable_when_conflict_exists() {
    let mock_server = MockServer::start().await;
    let mut cfg = TestConfig::default().to_app_config();
    cfg.supabase_url = mock_server.uri();
    let config = Arc::new(cfg);

    let doctor_id = Uuid::new_v4();
    let start = Utc::now() + Duration::days(1);
    let end = start + Duration::minutes(30);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                Uuid::new_v4(),
                &Uuid::new_v4().to_string(),
                doctor_id,
                &start.to_rfc3339(),
                &end.to_rfc3339(),
            )
        ])))
        .mount(&mock_server)
        .await;

    let query = CheckAvailabilityQuery { doctor_id, start_time: start, end_time: end };
    let result = check_availability(State(config), Query(query)).await;
    assert!(result.is_ok());
    let body = result.unwrap().0;
    assert_eq!(body["available"], false);
}
