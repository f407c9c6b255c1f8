use chrono::{DateTime, Utc};
use shared_database::SupabaseClient;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError};

/// Conflict Detector: given (doctor, start, end, exclude?), returns the non-cancelled
/// appointments for that doctor whose interval overlaps `[start, end)`. Only
/// `Scheduled`/`Confirmed` appointments participate - touching intervals never conflict.
pub struct ConflictDetectionService<'a> {
    db: &'a SupabaseClient,
}

impl<'a> ConflictDetectionService<'a> {
    pub fn new(db: &'a SupabaseClient) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn detect_conflicts(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        // PostgREST can't express the overlap test itself; pull the doctor's live appointments
        // in the neighborhood and apply `start < end AND end > start` in-process, the same
        // narrowing-then-filtering split the teacher's conflict service used.
        let filter = format!(
            "doctor_id=eq.{}&status=in.(scheduled,confirmed)&order=start_time.asc",
            doctor_id
        );
        let candidates: Vec<Appointment> = self
            .db
            .select("appointments", &filter)
            .await
            .map_err(|e| AppointmentError::Storage(e.to_string()))?;

        Ok(candidates
            .into_iter()
            .filter(|a| a.status.holds_the_slot())
            .filter(|a| exclude.map(|id| a.id != id).unwrap_or(true))
            .filter(|a| a.overlaps(start, end))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn appointment_at(start: DateTime<Utc>, minutes: i64) -> Appointment {
        Appointment {
            start_time: start,
            end_time: start + Duration::minutes(minutes),
            status: crate::models::AppointmentStatus::Scheduled,
            ..Default::default()
        }
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        let first = appointment_at(Utc::now(), 30);
        let second_start = first.end_time;
        assert!(!first.overlaps(second_start, second_start + Duration::minutes(30)));
    }

    #[test]
    fn partially_overlapping_intervals_conflict() {
        let first = appointment_at(Utc::now(), 30);
        let second_start = first.start_time + Duration::minutes(15);
        assert!(first.overlaps(second_start, second_start + Duration::minutes(30)));
    }
}
