use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::{SlotGeneratorService, SlotStatus, TimeSlot};

use crate::models::{Appointment, AppointmentError, AppointmentStatus, CancelledBy};
use crate::services::conflict::ConflictDetectionService;

const LOCK_TIMEOUT_SECS: i64 = 30;
const LOCK_RETRY_ATTEMPTS: u32 = 3;

/// Calendar Store's appointment write path: `BookTimeSlot`/`CancelAppointment`/
/// `RescheduleAppointment`. Every multi-row write opens a "transaction" - in the absence of a
/// real database transaction behind the PostgREST data API, this is an advisory lock on
/// `(doctor, interval)` via `scheduling_locks` (see `shared_database::acquire_lock`) scoping a
/// conflict-check-then-write sequence, with panics inside the sequence recovered, rolled back
/// (lock released, no partial write left committed) and logged - never re-raised.
pub struct CalendarStoreService {
    config: AppConfig,
}

impl CalendarStoreService {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> SupabaseClient {
        SupabaseClient::new(&self.config)
    }

    fn slot_generator(&self) -> SlotGeneratorService {
        SlotGeneratorService::new(self.db())
    }

    #[instrument(skip(self))]
    pub async fn get_appointment(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        let filter = format!("id=eq.{}", id);
        let rows: Vec<Appointment> = self
            .db()
            .select("appointments", &filter)
            .await
            .map_err(|e| AppointmentError::Storage(e.to_string()))?;
        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    #[instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut filter = format!("user_id=eq.{}", user_id);
        if let Some(status) = status {
            filter.push_str(&format!("&status=eq.{}", status_str(status)));
        }
        filter.push_str("&order=start_time.asc");
        self.db()
            .select("appointments", &filter)
            .await
            .map_err(|e| AppointmentError::Storage(e.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        day: chrono::NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let day_start = day.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let day_end = day_start + Duration::days(1);
        let filter = format!(
            "doctor_id=eq.{}&start_time=gte.{}&start_time=lt.{}&order=start_time.asc",
            doctor_id,
            day_start.to_rfc3339(),
            day_end.to_rfc3339()
        );
        self.db()
            .select("appointments", &filter)
            .await
            .map_err(|e| AppointmentError::Storage(e.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn list_upcoming_for_user(&self, user_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        let filter = format!(
            "user_id=eq.{}&status=eq.scheduled&start_time=gt.{}&order=start_time.asc",
            user_id,
            Utc::now().to_rfc3339()
        );
        self.db()
            .select("appointments", &filter)
            .await
            .map_err(|e| AppointmentError::Storage(e.to_string()))
    }

    /// `BookTimeSlot`: re-checks conflicts under the lock, inserts the appointment as
    /// `Scheduled`, and flips the covering `AVAILABLE` slot to `BOOKED` if one exists. A booking
    /// outside any materialized slot (ad-hoc) is not an error.
    #[instrument(skip(self, appointment))]
    pub async fn book_time_slot(&self, mut appointment: Appointment) -> Result<Appointment, AppointmentError> {
        if appointment.end_time <= appointment.start_time {
            appointment.end_time = appointment.start_time + Duration::minutes(appointment.duration_minutes as i64);
        }

        let lock_key = lock_key_for(appointment.doctor_id, appointment.start_time, appointment.end_time);
        let doctor_id = appointment.doctor_id;
        let start = appointment.start_time;
        let end = appointment.end_time;

        self.with_lock(lock_key, async {
            let db = self.db();
            let conflicts = ConflictDetectionService::new(&db)
                .detect_conflicts(doctor_id, start, end, None)
                .await?;
            if !conflicts.is_empty() {
                return Err(AppointmentError::SlotUnavailable { alternatives: vec![] });
            }

            let now = Utc::now();
            appointment.id = Uuid::new_v4();
            appointment.status = AppointmentStatus::Scheduled;
            appointment.created_at = now;
            appointment.updated_at = now;

            let inserted: Appointment = db
                .insert("appointments", &appointment_row(&appointment))
                .await
                .map_err(|e| AppointmentError::Storage(e.to_string()))?;

            if let Err(e) = self.flip_covering_slot_booked(doctor_id, start, end, inserted.id).await {
                self.compensate_appointment_insert(inserted.id).await;
                return Err(e);
            }

            Ok(inserted)
        })
        .await
    }

    /// Looks up the slot covering `[start, end)` and flips it to `BOOKED`; a missing covering
    /// slot is not an error (ad-hoc bookings outside materialized slots are permitted).
    async fn flip_covering_slot_booked(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        appointment_id: Uuid,
    ) -> Result<(), AppointmentError> {
        if let Some(slot) = self.find_covering_slot(doctor_id, start, end).await? {
            self.mark_slot_booked(&slot, appointment_id).await?;
        }
        Ok(())
    }

    /// Best-effort compensation for a write sequence that inserted an appointment but failed a
    /// later step in the same lock-guarded sequence (e.g. the slot flip). Deletes the row that
    /// was just inserted so a failed booking/reschedule never leaves an orphaned appointment
    /// behind; failure to delete is logged, never propagated - the caller already has the real
    /// error to report.
    async fn compensate_appointment_insert(&self, appointment_id: Uuid) {
        let filter = format!("id=eq.{}", appointment_id);
        if let Err(e) = self.db().delete("appointments", &filter).await {
            error!(
                %appointment_id,
                "failed to compensate for a partially-failed write by deleting the appointment row: {}",
                e
            );
        }
    }

    /// `CancelAppointment`: marks the appointment cancelled and frees the slot that referenced
    /// it, if any.
    #[instrument(skip(self))]
    pub async fn cancel_appointment(
        &self,
        id: Uuid,
        cancelled_by: CancelledBy,
        reason: String,
    ) -> Result<Appointment, AppointmentError> {
        let lock_key = format!("appt:{}:cancel", id);

        self.with_lock(lock_key, async {
            let existing = self.get_appointment(id).await?;
            if existing.status.is_terminal() {
                return Err(AppointmentError::TerminalState);
            }

            let now = Utc::now();
            let patch = serde_json::json!({
                "status": "cancelled",
                "cancelled_at": now,
                "cancelled_by": cancelled_by_str(cancelled_by),
                "cancellation_reason": reason,
                "updated_at": now,
            });

            let filter = format!("id=eq.{}", id);
            let updated: Vec<Appointment> = self
                .db()
                .patch("appointments", &filter, &patch)
                .await
                .map_err(|e| AppointmentError::Storage(e.to_string()))?;
            let updated = updated.into_iter().next().ok_or(AppointmentError::NotFound)?;

            if let Some(slot) = self.slot_referencing(id).await? {
                self.mark_slot_available(&slot).await?;
            }

            Ok(updated)
        })
        .await
    }

    /// `RescheduleAppointment`: re-checks conflicts for the new interval (excluding the original
    /// appointment), inserts the replacement appointment, marks the original `Rescheduled`, and
    /// swaps the slot bookings.
    #[instrument(skip(self))]
    pub async fn reschedule_appointment(
        &self,
        id: Uuid,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        let original = self.get_appointment(id).await?;
        let lock_key = lock_key_for(original.doctor_id, new_start, new_end);
        let doctor_id = original.doctor_id;

        self.with_lock(lock_key, async {
            if original.status.is_terminal() {
                return Err(AppointmentError::TerminalState);
            }

            let db = self.db();
            let conflicts = ConflictDetectionService::new(&db)
                .detect_conflicts(doctor_id, new_start, new_end, Some(id))
                .await?;
            if !conflicts.is_empty() {
                return Err(AppointmentError::SlotUnavailable { alternatives: vec![] });
            }

            let now = Utc::now();
            let mut replacement = original.clone();
            replacement.id = Uuid::new_v4();
            replacement.start_time = new_start;
            replacement.end_time = new_end;
            replacement.duration_minutes = (new_end - new_start).num_minutes() as i32;
            replacement.status = AppointmentStatus::Scheduled;
            replacement.rescheduled_from_id = Some(original.id);
            replacement.rescheduled_to_id = None;
            replacement.reschedule_count = original.reschedule_count + 1;
            replacement.cancelled_at = None;
            replacement.cancelled_by = None;
            replacement.cancellation_reason = None;
            replacement.reminder_sent = false;
            replacement.created_at = now;
            replacement.updated_at = now;

            let inserted: Appointment = db
                .insert("appointments", &appointment_row(&replacement))
                .await
                .map_err(|e| AppointmentError::Storage(e.to_string()))?;

            if let Err(e) = self
                .finish_reschedule(&db, original.id, inserted.id, doctor_id, new_start, new_end, now)
                .await
            {
                self.compensate_appointment_insert(inserted.id).await;
                return Err(e);
            }

            Ok(inserted)
        })
        .await
    }

    /// The remainder of `RescheduleAppointment` once the replacement row exists: mark the
    /// original rescheduled, free the old slot, and book the new one. Kept as one fallible unit
    /// so a failure partway through lets the caller compensate by deleting the just-inserted
    /// replacement appointment rather than leaving it orphaned.
    async fn finish_reschedule(
        &self,
        db: &SupabaseClient,
        original_id: Uuid,
        replacement_id: Uuid,
        doctor_id: Uuid,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        let patch = serde_json::json!({
            "status": "rescheduled",
            "rescheduled_to_id": replacement_id,
            "updated_at": now,
        });
        let filter = format!("id=eq.{}", original_id);
        let _: Vec<Appointment> = db
            .patch("appointments", &filter, &patch)
            .await
            .map_err(|e| AppointmentError::Storage(e.to_string()))?;

        if let Some(old_slot) = self.slot_referencing(original_id).await? {
            self.mark_slot_available(&old_slot).await?;
        }
        self.flip_covering_slot_booked(doctor_id, new_start, new_end, replacement_id).await
    }

    async fn find_covering_slot(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<TimeSlot>, AppointmentError> {
        let slots = self
            .slot_generator()
            .slots_for_day(doctor_id, start.date_naive())
            .await
            .map_err(|e| AppointmentError::Storage(e.to_string()))?;
        Ok(slots
            .into_iter()
            .find(|s| s.status == SlotStatus::Available && s.start == start && s.end == end))
    }

    async fn slot_referencing(&self, appointment_id: Uuid) -> Result<Option<TimeSlot>, AppointmentError> {
        let filter = format!("appointment_id=eq.{}", appointment_id);
        let slots: Vec<TimeSlot> = self
            .db()
            .select("time_slots", &filter)
            .await
            .map_err(|e| AppointmentError::Storage(e.to_string()))?;
        Ok(slots.into_iter().next())
    }

    async fn mark_slot_booked(&self, slot: &TimeSlot, appointment_id: Uuid) -> Result<(), AppointmentError> {
        let filter = format!("id=eq.{}", slot.id);
        let patch = serde_json::json!({
            "status": SlotStatus::Booked,
            "appointment_id": appointment_id,
            "updated_at": Utc::now(),
        });
        let _: Vec<TimeSlot> = self
            .db()
            .patch("time_slots", &filter, &patch)
            .await
            .map_err(|e| AppointmentError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn mark_slot_available(&self, slot: &TimeSlot) -> Result<(), AppointmentError> {
        let filter = format!("id=eq.{}", slot.id);
        let patch = serde_json::json!({
            "status": SlotStatus::Available,
            "appointment_id": Option::<Uuid>::None,
            "updated_at": Utc::now(),
        });
        let _: Vec<TimeSlot> = self
            .db()
            .patch("time_slots", &filter, &patch)
            .await
            .map_err(|e| AppointmentError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Acquires the advisory lock for `lock_key`, runs `body`, then always releases the lock -
    /// a panic inside `body` is caught, the lock is still released, and the panic is logged
    /// rather than propagated to the caller. Lock contention is retried a bounded number of
    /// times with a short backoff before being reported as a storage failure.
    async fn with_lock<T>(
        &self,
        lock_key: String,
        body: impl std::future::Future<Output = Result<T, AppointmentError>>,
    ) -> Result<T, AppointmentError> {
        let db = self.db();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match db.acquire_lock(&lock_key, LOCK_TIMEOUT_SECS).await {
                Ok(()) => break,
                Err(e) if attempt < LOCK_RETRY_ATTEMPTS => {
                    warn!(lock_key, attempt, "lock contention, retrying: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(100 * attempt as u64)).await;
                }
                Err(e) => return Err(AppointmentError::Storage(format!("could not acquire lock: {}", e))),
            }
        }

        let result = AssertUnwindSafe(body).catch_unwind().await;
        db.release_lock(&lock_key).await;

        match result {
            Ok(inner) => inner,
            Err(_) => {
                error!(lock_key, "transaction body panicked; rolled back");
                Err(AppointmentError::Storage("internal error during booking transaction".into()))
            }
        }
    }
}

fn lock_key_for(doctor_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!("appt:{}:{}:{}", doctor_id, start.timestamp(), end.timestamp())
}

fn status_str(status: AppointmentStatus) -> &'static str {
    match status {
        AppointmentStatus::Scheduled => "scheduled",
        AppointmentStatus::Confirmed => "confirmed",
        AppointmentStatus::Completed => "completed",
        AppointmentStatus::Cancelled => "cancelled",
        AppointmentStatus::Rescheduled => "rescheduled",
        AppointmentStatus::NoShow => "no_show",
    }
}

fn cancelled_by_str(by: CancelledBy) -> &'static str {
    match by {
        CancelledBy::Patient => "patient",
        CancelledBy::Doctor => "doctor",
        CancelledBy::System => "system",
    }
}

fn appointment_row(appointment: &Appointment) -> serde_json::Value {
    info!(appointment_id = %appointment.id, "writing appointment row");
    serde_json::to_value(appointment).expect("Appointment always serializes")
}
