use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use notification_cell::ReminderScheduler;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use uuid::Uuid;

use crate::models::{
    AppointmentError, AppointmentStatus, BookAppointmentRequest, CancelAppointmentRequest,
    CancelledBy, RescheduleAppointmentRequest,
};
use crate::services::{BookingEngine, CalendarStoreService};

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound => AppError::NotFound("appointment not found".into()),
            AppointmentError::DoctorNotFound => AppError::NotFound("doctor not found".into()),
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::SlotUnavailable { .. } => {
                AppError::Conflict("requested slot is unavailable".into())
            }
            AppointmentError::Storage(msg) => AppError::Database(msg),
            AppointmentError::TerminalState => {
                AppError::Conflict("appointment is in a terminal state".into())
            }
        }
    }
}

/// `SlotUnavailable` carries alternatives the generic `AppError::Conflict` conversion above
/// discards; booking/reschedule handlers build the 409 response from it directly instead of
/// going through `AppError`.
fn slot_unavailable_response(alternatives: Vec<doctor_cell::TimeSlot>) -> axum::response::Response {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    (
        StatusCode::CONFLICT,
        Json(json!({
            "success": false,
            "message": "requested slot is unavailable",
            "alternatives": alternatives,
        })),
    )
        .into_response()
}

fn store(config: &AppConfig) -> CalendarStoreService {
    CalendarStoreService::new(config.clone())
}

fn engine(config: &AppConfig, reminders: Arc<ReminderScheduler>) -> BookingEngine {
    BookingEngine::new(config.clone(), reminders)
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(config): State<Arc<AppConfig>>,
    State(reminders): State<Arc<ReminderScheduler>>,
    Extension(user): Extension<User>,
    Json(req): Json<BookAppointmentRequest>,
) -> Result<axum::response::Response, AppError> {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|_| AppError::Auth("invalid user id in token".into()))?;

    match engine(&config, reminders).book(user_id, req).await {
        Ok(appointment) => Ok((
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "message": "appointment booked",
                "appointment": appointment,
            })),
        )
            .into_response()),
        Err(AppointmentError::SlotUnavailable { alternatives }) => {
            Ok(slot_unavailable_response(alternatives))
        }
        Err(e) => Err(e.into()),
    }
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(config): State<Arc<AppConfig>>,
    State(reminders): State<Arc<ReminderScheduler>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let cancelled_by = if user.role.as_deref() == Some("doctor") {
        CancelledBy::Doctor
    } else {
        CancelledBy::Patient
    };

    let cancelled = engine(&config, reminders).cancel(id, cancelled_by, req.reason).await?;
    Ok(Json(json!({
        "success": true,
        "message": "appointment cancelled",
        "appointment": cancelled,
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(config): State<Arc<AppConfig>>,
    State(reminders): State<Arc<ReminderScheduler>>,
    Extension(_user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(req): Json<RescheduleAppointmentRequest>,
) -> Result<axum::response::Response, AppError> {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    let original = store(&config)
        .get_appointment(id)
        .await
        .map_err(AppError::from)?;
    let duration = req
        .duration_minutes
        .unwrap_or(original.duration_minutes) as i64;
    let new_end = req.new_appointment_time + chrono::Duration::minutes(duration);

    match engine(&config, reminders).reschedule(id, req.new_appointment_time, new_end).await {
        Ok(appointment) => Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "appointment rescheduled",
                "appointment": appointment,
            })),
        )
            .into_response()),
        Err(AppointmentError::SlotUnavailable { alternatives }) => {
            Ok(slot_unavailable_response(alternatives))
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub doctor_id: Uuid,
    pub date: Option<chrono::NaiveDate>,
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
}

#[axum::debug_handler]
pub async fn get_availability(
    State(config): State<Arc<AppConfig>>,
    State(reminders): State<Arc<ReminderScheduler>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let eng = engine(&config, reminders);

    if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
        if end < start {
            return Err(AppError::ValidationError("end_date must not precede start_date".into()));
        }
        let by_day = eng.get_availability_range(query.doctor_id, start, end).await;
        let range: std::collections::BTreeMap<_, _> = by_day
            .into_iter()
            .map(|(day, (slots, total, booked))| {
                (
                    day,
                    json!({
                        "available_slots": slots,
                        "total_slots": total,
                        "booked_count": booked,
                    }),
                )
            })
            .collect();
        return Ok(Json(json!({ "range": range })));
    }

    let date = query
        .date
        .ok_or_else(|| AppError::ValidationError("date or start_date/end_date is required".into()))?;
    let (slots, total, booked) = eng.get_availability(query.doctor_id, date).await?;
    Ok(Json(json!({
        "availability": {
            "doctor_id": query.doctor_id,
            "date": date,
            "available_slots": slots,
            "total_slots": total,
            "booked_count": booked,
        }
    })))
}

#[derive(Debug, Deserialize)]
pub struct PatientAppointmentsQuery {
    pub status: Option<AppointmentStatus>,
}

#[axum::debug_handler]
pub async fn list_patient_appointments(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Query(query): Query<PatientAppointmentsQuery>,
) -> Result<Json<Value>, AppError> {
    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|_| AppError::Auth("invalid user id in token".into()))?;

    let appointments = store(&config).list_for_user(user_id, query.status).await?;
    let total = appointments.len();
    Ok(Json(json!({ "appointments": appointments, "total": total })))
}

#[axum::debug_handler]
pub async fn list_upcoming_appointments(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|_| AppError::Auth("invalid user id in token".into()))?;

    let appointments = store(&config).list_upcoming_for_user(user_id).await?;
    Ok(Json(json!({ "appointments": appointments })))
}

#[derive(Debug, Deserialize)]
pub struct DoctorAppointmentsQuery {
    pub date: chrono::NaiveDate,
}

#[axum::debug_handler]
pub async fn list_doctor_appointments(
    State(config): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DoctorAppointmentsQuery>,
) -> Result<Json<Value>, AppError> {
    let appointments = store(&config).list_for_doctor(doctor_id, query.date).await?;
    Ok(Json(json!({ "appointments": appointments })))
}

#[derive(Debug, Deserialize)]
pub struct CheckAvailabilityQuery {
    pub doctor_id: Uuid,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
}

#[axum::debug_handler]
pub async fn check_availability(
    State(config): State<Arc<AppConfig>>,
    Query(query): Query<CheckAvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    if query.end_time <= query.start_time {
        return Err(AppError::ValidationError("end_time must be after start_time".into()));
    }

    let db = shared_database::SupabaseClient::new(&config);
    let conflicts = crate::services::ConflictDetectionService::new(&db)
        .detect_conflicts(query.doctor_id, query.start_time, query.end_time, None)
        .await?;

    Ok(Json(json!({ "available": conflicts.is_empty() })))
}
