use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use shared_database::SupabaseClient;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    CreateBreakRequest, CreateWeeklyScheduleRequest, DoctorBreak, DoctorError, SlotStatus,
    TimeSlot, WeeklySchedule,
};

/// Slot Generator plus the TimeSlot/DoctorBreak/WeeklySchedule persistence the teacher's
/// `doctor-cell/src/services/scheduling.rs` covered; grounded on that file's working-hours
/// expansion loop, stripped of its buffer-time and concurrent-appointment extensions (per the
/// project-level conflict rule: touching intervals never conflict, no buffer padding).
pub struct SlotGeneratorService {
    db: SupabaseClient,
}

impl SlotGeneratorService {
    pub fn new(db: SupabaseClient) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_weekly_schedule(
        &self,
        req: CreateWeeklyScheduleRequest,
    ) -> Result<WeeklySchedule, DoctorError> {
        if !(15..=180).contains(&req.slot_duration_minutes) {
            return Err(DoctorError::Validation(
                "slot_duration_minutes must be between 15 and 180".into(),
            ));
        }
        for hours in req.working_hours.iter().flatten() {
            if hours.end <= hours.start {
                return Err(DoctorError::Validation(
                    "working hours end must be after start".into(),
                ));
            }
        }

        let now = Utc::now();
        let row = serde_json::json!({
            "doctor_id": req.doctor_id,
            "slot_duration_minutes": req.slot_duration_minutes,
            "working_hours": req.working_hours,
            "is_active": true,
            "created_at": now,
            "updated_at": now,
        });

        self.db
            .insert("doctor_schedules", &row)
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_weekly_schedule(&self, doctor_id: Uuid) -> Result<WeeklySchedule, DoctorError> {
        let filter = format!("doctor_id=eq.{}", doctor_id);
        let rows: Vec<WeeklySchedule> = self
            .db
            .select("doctor_schedules", &filter)
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))?;
        rows.into_iter().next().ok_or(DoctorError::NotFound)
    }

    #[instrument(skip(self))]
    pub async fn get_breaks(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<DoctorBreak>, DoctorError> {
        let filter = format!("doctor_id=eq.{}&date=eq.{}", doctor_id, date);
        self.db
            .select("doctor_breaks", &filter)
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn create_break(&self, req: CreateBreakRequest) -> Result<DoctorBreak, DoctorError> {
        if req.end <= req.start {
            return Err(DoctorError::Validation("break end must be after start".into()));
        }

        let row = serde_json::json!({
            "id": Uuid::new_v4(),
            "doctor_id": req.doctor_id,
            "date": req.date,
            "start": req.start,
            "end": req.end,
            "reason": req.reason,
            "recurring": req.recurring,
            "created_at": Utc::now(),
        });

        self.db
            .insert("doctor_breaks", &row)
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn delete_break(&self, id: Uuid) -> Result<(), DoctorError> {
        let filter = format!("id=eq.{}", id);
        self.db
            .delete("doctor_breaks", &filter)
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))
    }

    /// Bulk-insert `n = floor((end-start)/duration)` consecutive AVAILABLE slots. Fails with
    /// `SlotOverlap` if any existing slot for the doctor intersects [start, end).
    #[instrument(skip(self))]
    pub async fn create_time_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<Vec<TimeSlot>, DoctorError> {
        let existing = self.slots_for_day(doctor_id, date).await?;
        if existing.iter().any(|s| s.start < end && s.end > start) {
            return Err(DoctorError::SlotOverlap);
        }

        let candidates = generate_intervals(start, end, duration_minutes);
        let now = Utc::now();
        let mut created = Vec::with_capacity(candidates.len());

        for (slot_start, slot_end) in candidates {
            let row = serde_json::json!({
                "id": Uuid::new_v4(),
                "doctor_id": doctor_id,
                "date": date,
                "start": slot_start,
                "end": slot_end,
                "duration_minutes": duration_minutes,
                "status": SlotStatus::Available,
                "appointment_id": Option::<Uuid>::None,
                "created_at": now,
                "updated_at": now,
            });
            let slot: TimeSlot = self
                .db
                .insert("time_slots", &row)
                .await
                .map_err(|e| DoctorError::Storage(e.to_string()))?;
            created.push(slot);
        }

        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn slots_for_day(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<TimeSlot>, DoctorError> {
        let filter = format!("doctor_id=eq.{}&date=eq.{}&order=start.asc", doctor_id, date);
        self.db
            .select("time_slots", &filter)
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn block_slots(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), DoctorError> {
        let date = start.date_naive();
        let slots = self.slots_for_day(doctor_id, date).await?;
        for slot in slots
            .into_iter()
            .filter(|s| s.status == SlotStatus::Available && s.start < end && s.end > start)
        {
            let filter = format!("id=eq.{}", slot.id);
            let patch = serde_json::json!({ "status": SlotStatus::Blocked, "updated_at": Utc::now() });
            let _: Vec<TimeSlot> = self
                .db
                .patch("time_slots", &filter, &patch)
                .await
                .map_err(|e| DoctorError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn unblock_slots(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), DoctorError> {
        let date = start.date_naive();
        let slots = self.slots_for_day(doctor_id, date).await?;
        for slot in slots
            .into_iter()
            .filter(|s| s.status == SlotStatus::Blocked && s.start < end && s.end > start)
        {
            let filter = format!("id=eq.{}", slot.id);
            let patch = serde_json::json!({ "status": SlotStatus::Available, "updated_at": Utc::now() });
            let _: Vec<TimeSlot> = self
                .db
                .patch("time_slots", &filter, &patch)
                .await
                .map_err(|e| DoctorError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    /// Expands the doctor's weekly working-hours template into concrete dated slots for one day,
    /// marking anything intersecting a break as BLOCKED rather than AVAILABLE. Like
    /// `create_time_slots`, refuses to run over a day that already has slots rather than
    /// silently duplicating rows on a repeated generation call.
    #[instrument(skip(self))]
    pub async fn generate_day_slots(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<TimeSlot>, DoctorError> {
        let existing = self.slots_for_day(doctor_id, date).await?;
        if !existing.is_empty() {
            return Err(DoctorError::SlotOverlap);
        }

        let schedule = self.get_weekly_schedule(doctor_id).await?;
        let Some(hours) = schedule.hours_for(date.weekday()) else {
            debug!(%doctor_id, %date, "no working hours for weekday, nothing generated");
            return Ok(Vec::new());
        };

        let day_start = date.and_time(hours.start).and_utc();
        let day_end = date.and_time(hours.end).and_utc();
        let breaks = self.get_breaks(doctor_id, date).await?;

        let candidates = generate_intervals(day_start, day_end, schedule.slot_duration_minutes);
        let now = Utc::now();
        let mut created = Vec::with_capacity(candidates.len());

        for (slot_start, slot_end) in candidates {
            let status = if breaks.iter().any(|b| b.start < slot_end && b.end > slot_start) {
                SlotStatus::Blocked
            } else {
                SlotStatus::Available
            };

            let row = serde_json::json!({
                "id": Uuid::new_v4(),
                "doctor_id": doctor_id,
                "date": date,
                "start": slot_start,
                "end": slot_end,
                "duration_minutes": schedule.slot_duration_minutes,
                "status": status,
                "appointment_id": Option::<Uuid>::None,
                "created_at": now,
                "updated_at": now,
            });
            let slot: TimeSlot = self
                .db
                .insert("time_slots", &row)
                .await
                .map_err(|e| DoctorError::Storage(e.to_string()))?;
            created.push(slot);
        }

        info!(%doctor_id, %date, count = created.len(), "generated day slots");
        Ok(created)
    }

    /// Generates slots for `start_day` through `start_day + 6`. A failure on any single day is
    /// logged and does not abort the remaining days.
    #[instrument(skip(self))]
    pub async fn generate_week_slots(&self, doctor_id: Uuid, start_day: NaiveDate) -> Vec<TimeSlot> {
        let mut all = Vec::new();
        for offset in 0..7 {
            let date = start_day + Duration::days(offset);
            match self.generate_day_slots(doctor_id, date).await {
                Ok(slots) => all.extend(slots),
                Err(e) => warn!(%doctor_id, %date, error = %e, "failed to generate slots for day"),
            }
        }
        all
    }
}

/// Pure slot-interval math, deliberately free of I/O so it can be unit tested without a server.
fn generate_intervals(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    duration_minutes: i32,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let duration = Duration::minutes(duration_minutes as i64);
    let mut intervals = Vec::new();
    let mut current = start;

    while current + duration <= end {
        intervals.push((current, current + duration));
        current += duration;
    }

    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generates_consecutive_fixed_duration_slots() {
        let start = Utc.with_ymd_and_hms(2026, 8, 3, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 8, 3, 10, 5, 0).unwrap();

        let slots = generate_intervals(start, end, 30);

        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].0, start);
        assert_eq!(slots[1].1, start + Duration::minutes(60));
    }

    #[test]
    fn discards_trailing_partial_slot() {
        let start = Utc.with_ymd_and_hms(2026, 8, 3, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 8, 3, 9, 40, 0).unwrap();

        let slots = generate_intervals(start, end, 30);

        assert_eq!(slots.len(), 1);
    }

    #[test]
    fn empty_window_produces_no_slots() {
        let start = Utc.with_ymd_and_hms(2026, 8, 3, 9, 0, 0).unwrap();
        assert!(generate_intervals(start, start, 30).is_empty());
    }
}
