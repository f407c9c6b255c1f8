use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Sms,
    Email,
    Push,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Confirmation,
    Reminder,
    Cancellation,
    Reschedule,
    AutoReschedule,
    DoctorNew,
    DoctorCancel,
    SystemAlert,
    Bulk,
}

/// A structured event handed to the dispatcher. The dispatcher renders a message from `kind`
/// and the payload fields present, then hands it to the channel adapter matching `channel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub recipient: String,
    pub channel: NotificationChannel,
    pub appointment_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub detail: Option<String>,
}

impl NotificationEvent {
    pub fn render(&self) -> String {
        match self.kind {
            NotificationKind::Confirmation => format!(
                "Your appointment is confirmed for {}.",
                self.scheduled_start
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "the scheduled time".to_string())
            ),
            NotificationKind::Reminder => format!(
                "Reminder: you have an appointment at {}.",
                self.scheduled_start
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "the scheduled time".to_string())
            ),
            NotificationKind::Cancellation => "Your appointment has been cancelled.".to_string(),
            NotificationKind::Reschedule => format!(
                "Your appointment has been rescheduled to {}.",
                self.scheduled_start
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "a new time".to_string())
            ),
            NotificationKind::AutoReschedule => {
                "Your appointment was automatically rescheduled due to a conflict.".to_string()
            }
            NotificationKind::DoctorNew => "A new doctor has joined the practice.".to_string(),
            NotificationKind::DoctorCancel => {
                "Your doctor is no longer available; please rebook.".to_string()
            }
            NotificationKind::SystemAlert => self
                .detail
                .clone()
                .unwrap_or_else(|| "System alert.".to_string()),
            NotificationKind::Bulk => self
                .detail
                .clone()
                .unwrap_or_else(|| "Notice from the clinic.".to_string()),
        }
    }
}
