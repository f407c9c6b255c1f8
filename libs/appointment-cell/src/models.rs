use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    Rescheduled,
    NoShow,
}

impl AppointmentStatus {
    /// Only these statuses participate in conflict detection and the non-overlap invariant.
    pub fn holds_the_slot(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Cancelled
                | AppointmentStatus::Completed
                | AppointmentStatus::NoShow
                | AppointmentStatus::Rescheduled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[serde(alias = "initial_consultation", alias = "new_patient")]
    InitialConsultation,
    #[serde(alias = "follow_up", alias = "followup")]
    FollowUpConsultation,
    #[serde(alias = "emergency")]
    EmergencyConsultation,
    #[serde(alias = "specialist")]
    SpecialtyConsultation,
    #[serde(alias = "general")]
    GeneralConsultation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    Sms,
    Email,
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Patient,
    Doctor,
    System,
}

/// The scheduling core's central entity. `end = start + duration` is maintained by every write
/// path, never trusted from client input beyond the initial request's `duration`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub appointment_type: AppointmentType,
    pub notes: Option<String>,

    pub reminder_type: ReminderType,
    pub reminder_lead_minutes: i32,
    pub reminder_sent: bool,

    pub confirmed_at: Option<DateTime<Utc>>,

    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<CancelledBy>,
    pub cancellation_reason: Option<String>,

    pub rescheduled_from_id: Option<Uuid>,
    pub rescheduled_to_id: Option<Uuid>,
    pub reschedule_count: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Appointment {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            doctor_id: Uuid::nil(),
            start_time: now,
            end_time: now,
            duration_minutes: 0,
            status: AppointmentStatus::Scheduled,
            appointment_type: AppointmentType::GeneralConsultation,
            notes: None,
            reminder_type: ReminderType::Email,
            reminder_lead_minutes: 60,
            reminder_sent: false,
            confirmed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            rescheduled_from_id: None,
            rescheduled_to_id: None,
            reschedule_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Appointment {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && self.end_time > start
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub appointment_time: DateTime<Utc>,
    #[serde(alias = "duration")]
    pub duration_minutes: i32,
    #[serde(default)]
    pub appointment_type: Option<AppointmentType>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub reminder_type: Option<ReminderType>,
    #[serde(default, alias = "reminder_time")]
    pub reminder_lead_minutes: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_appointment_time: DateTime<Utc>,
    #[serde(default, alias = "duration")]
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityResponse {
    pub doctor_id: Uuid,
    pub date: chrono::NaiveDate,
    pub available_slots: Vec<doctor_cell::TimeSlot>,
    pub total_slots: i64,
    pub booked_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityRangeResponse {
    pub doctor_id: Uuid,
    pub start_date: chrono::NaiveDate,
    pub end_date: chrono::NaiveDate,
    pub by_day: std::collections::BTreeMap<chrono::NaiveDate, AvailabilityResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingFailure {
    pub success: bool,
    pub message: String,
    pub alternatives: Vec<doctor_cell::TimeSlot>,
}

#[derive(Debug, Error, Clone)]
pub enum AppointmentError {
    #[error("appointment not found")]
    NotFound,
    #[error("doctor not found")]
    DoctorNotFound,
    #[error("validation error: {0}")]
    Validation(String),
    #[error("slot unavailable")]
    SlotUnavailable { alternatives: Vec<doctor_cell::TimeSlot> },
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("appointment is in a terminal state and cannot be modified")]
    TerminalState,
}
