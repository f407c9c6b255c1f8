use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maps chrono's `Weekday` (Monday-based) onto the wire's Sunday=0 convention.
pub fn weekday_index(weekday: Weekday) -> i32 {
    match weekday {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specialty {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSpecialtyRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub specialty_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDoctorRequest {
    pub name: String,
    pub specialty_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDoctorRequest {
    pub name: Option<String>,
    pub specialty_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedDoctors {
    pub data: Vec<Doctor>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub total_pages: i64,
    pub current_page: i64,
}

/// One weekday's working-hours window. `start`/`end` are wall-clock times, no timezone applied
/// by this layer - the clinic is assumed to operate in a single fixed timezone (see §5 in the
/// project-level spec for the out-of-scope multi-region case).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklySchedule {
    pub doctor_id: Uuid,
    pub slot_duration_minutes: i32,
    /// Indexed 0=Sunday..6=Saturday; `None` means the doctor does not work that day.
    pub working_hours: [Option<WorkingHours>; 7],
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WeeklySchedule {
    pub fn hours_for(&self, weekday: Weekday) -> Option<WorkingHours> {
        self.working_hours[weekday_index(weekday) as usize]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWeeklyScheduleRequest {
    pub doctor_id: Uuid,
    #[serde(alias = "slot_duration")]
    pub slot_duration_minutes: i32,
    pub working_hours: [Option<WorkingHours>; 7],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Booked,
    Blocked,
    Break,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: SlotStatus,
    pub appointment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorBreak {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reason: Option<String>,
    #[serde(default)]
    pub recurring: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBreakRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reason: Option<String>,
    #[serde(default)]
    pub recurring: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSlotsRequest {
    pub doctor_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorAvailabilityResponse {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub available_slots: Vec<TimeSlot>,
    pub total_slots: i64,
    pub booked_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSearchFilters {
    pub specialty_id: Option<Uuid>,
    pub active_only: Option<bool>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DoctorError {
    #[error("doctor not found")]
    NotFound,
    #[error("specialty not found")]
    SpecialtyNotFound,
    #[error("validation error: {0}")]
    Validation(String),
    #[error("slots already exist for this window")]
    SlotOverlap,
    #[error("storage failure: {0}")]
    Storage(String),
}
