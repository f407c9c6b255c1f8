use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use doctor_cell::{SlotStatus, TimeSlot};
use notification_cell::{
    NotificationChannel, NotificationDispatcher, NotificationEvent, NotificationKind, ReminderScheduler,
};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentType, BookAppointmentRequest, CancelledBy,
    ReminderType,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::store::CalendarStoreService;
use crate::services::suggester::AlternativeSuggesterService;

const MIN_DURATION_MINUTES: i32 = 15;
const MAX_DURATION_MINUTES: i32 = 180;

/// Booking Engine: orchestrates `Book`/`Cancel`/`Reschedule` as atomic units over the Calendar
/// Store and Conflict Detector, plus the read paths (`GetAvailability`/`GetAvailabilityRange`)
/// and `AutoRescheduleConflicts`. Storage failures are surfaced; conflicts are reported with
/// alternatives; notification failures are logged only and never fail the booking.
pub struct BookingEngine {
    config: AppConfig,
    store: CalendarStoreService,
    suggester: AlternativeSuggesterService,
    dispatcher: NotificationDispatcher,
    reminders: Arc<ReminderScheduler>,
}

impl BookingEngine {
    pub fn new(config: AppConfig, reminders: Arc<ReminderScheduler>) -> Self {
        Self {
            store: CalendarStoreService::new(config.clone()),
            suggester: AlternativeSuggesterService::new(config.clone()),
            dispatcher: NotificationDispatcher::new(),
            reminders,
            config,
        }
    }

    fn reminder_event(appointment: &Appointment, kind: NotificationKind) -> NotificationEvent {
        NotificationEvent {
            kind,
            recipient: appointment.user_id.to_string(),
            channel: channel_for(appointment.reminder_type),
            appointment_id: Some(appointment.id),
            doctor_id: Some(appointment.doctor_id),
            scheduled_start: Some(appointment.start_time),
            detail: None,
        }
    }

    #[instrument(skip(self, req))]
    pub async fn book(&self, user_id: Uuid, req: BookAppointmentRequest) -> Result<Appointment, AppointmentError> {
        if req.appointment_time <= Utc::now() {
            return Err(AppointmentError::Validation(
                "appointment_time must be strictly in the future".into(),
            ));
        }
        if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&req.duration_minutes) {
            return Err(AppointmentError::Validation(format!(
                "duration_minutes must be between {} and {}",
                MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
            )));
        }

        let end = req.appointment_time + Duration::minutes(req.duration_minutes as i64);

        let db = SupabaseClient::new(&self.config);
        doctor_cell::CatalogService::new(SupabaseClient::new(&self.config))
            .get_doctor(req.doctor_id)
            .await
            .map_err(|e| match e {
                doctor_cell::DoctorError::NotFound => AppointmentError::DoctorNotFound,
                other => AppointmentError::Storage(other.to_string()),
            })?;

        let conflicts = ConflictDetectionService::new(&db)
            .detect_conflicts(req.doctor_id, req.appointment_time, end, None)
            .await?;

        if !conflicts.is_empty() {
            let alternatives = self
                .suggester
                .suggest(req.doctor_id, req.appointment_time, req.duration_minutes)
                .await
                .unwrap_or_default();
            return Err(AppointmentError::SlotUnavailable { alternatives });
        }

        let appointment = Appointment {
            user_id,
            doctor_id: req.doctor_id,
            start_time: req.appointment_time,
            end_time: end,
            duration_minutes: req.duration_minutes,
            appointment_type: req.appointment_type.unwrap_or(AppointmentType::GeneralConsultation),
            notes: req.notes,
            reminder_type: req.reminder_type.unwrap_or(ReminderType::Email),
            reminder_lead_minutes: req.reminder_lead_minutes.unwrap_or(60).clamp(5, 1440),
            ..Appointment::default()
        };

        let booked = self.store.book_time_slot(appointment).await?;

        self.dispatcher
            .dispatch(Self::reminder_event(&booked, NotificationKind::Confirmation));

        let fire_at = booked.start_time - Duration::minutes(booked.reminder_lead_minutes as i64);
        self.reminders
            .schedule(booked.id, fire_at, Self::reminder_event(&booked, NotificationKind::Reminder))
            .await;

        Ok(booked)
    }

    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        id: Uuid,
        cancelled_by: CancelledBy,
        reason: String,
    ) -> Result<Appointment, AppointmentError> {
        let existing = self.store.get_appointment(id).await?;
        let cancelled = self.store.cancel_appointment(id, cancelled_by, reason).await?;

        self.dispatcher
            .dispatch(Self::reminder_event(&cancelled, NotificationKind::Cancellation));
        self.reminders.cancel(id).await;

        Ok(cancelled)
    }

    #[instrument(skip(self))]
    pub async fn reschedule(
        &self,
        id: Uuid,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        if new_start <= Utc::now() {
            return Err(AppointmentError::Validation(
                "new_appointment_time must be strictly in the future".into(),
            ));
        }

        let original = self.store.get_appointment(id).await?;

        let db = SupabaseClient::new(&self.config);
        let conflicts = ConflictDetectionService::new(&db)
            .detect_conflicts(original.doctor_id, new_start, new_end, Some(id))
            .await?;
        if !conflicts.is_empty() {
            let alternatives = self
                .suggester
                .suggest(original.doctor_id, new_start, (new_end - new_start).num_minutes() as i32)
                .await
                .unwrap_or_default();
            return Err(AppointmentError::SlotUnavailable { alternatives });
        }

        let rescheduled = self.store.reschedule_appointment(id, new_start, new_end).await?;

        self.dispatcher
            .dispatch(Self::reminder_event(&rescheduled, NotificationKind::Reschedule));

        self.reminders.cancel(original.id).await;
        let fire_at = rescheduled.start_time - Duration::minutes(rescheduled.reminder_lead_minutes as i64);
        self.reminders
            .schedule(
                rescheduled.id,
                fire_at,
                Self::reminder_event(&rescheduled, NotificationKind::Reminder),
            )
            .await;

        Ok(rescheduled)
    }

    #[instrument(skip(self))]
    pub async fn get_availability(
        &self,
        doctor_id: Uuid,
        day: chrono::NaiveDate,
    ) -> Result<(Vec<TimeSlot>, i64, i64), AppointmentError> {
        let slot_generator = doctor_cell::SlotGeneratorService::new(SupabaseClient::new(&self.config));
        let slots = slot_generator
            .slots_for_day(doctor_id, day)
            .await
            .map_err(|e| AppointmentError::Storage(e.to_string()))?;

        let total = slots.len() as i64;
        let booked = slots.iter().filter(|s| s.status == SlotStatus::Booked).count() as i64;
        let available = slots.into_iter().filter(|s| s.status == SlotStatus::Available).collect();

        Ok((available, total, booked))
    }

    /// Iterates `start_day..=end_day`; a failure fetching one day's availability is logged and
    /// that day is simply absent from the result rather than aborting the whole range.
    #[instrument(skip(self))]
    pub async fn get_availability_range(
        &self,
        doctor_id: Uuid,
        start_day: chrono::NaiveDate,
        end_day: chrono::NaiveDate,
    ) -> std::collections::BTreeMap<chrono::NaiveDate, (Vec<TimeSlot>, i64, i64)> {
        let mut by_day = std::collections::BTreeMap::new();
        let mut day = start_day;
        while day <= end_day {
            match self.get_availability(doctor_id, day).await {
                Ok(result) => {
                    by_day.insert(day, result);
                }
                Err(e) => warn!(%doctor_id, %day, error = %e, "failed to fetch availability for day"),
            }
            day += Duration::days(1);
        }
        by_day
    }

    /// For each live conflict in `[start, end)`, finds the first alternative and reschedules to
    /// it. A per-conflict failure (no alternative available, or the reschedule itself failing)
    /// is logged and the loop continues with the remaining conflicts.
    #[instrument(skip(self))]
    pub async fn auto_reschedule_conflicts(&self, doctor_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) {
        let db = SupabaseClient::new(&self.config);
        let conflicts = match ConflictDetectionService::new(&db)
            .detect_conflicts(doctor_id, start, end, None)
            .await
        {
            Ok(conflicts) => conflicts,
            Err(e) => {
                warn!(%doctor_id, error = %e, "auto-reschedule: failed to load conflicts");
                return;
            }
        };

        for conflict in conflicts {
            let alternatives = match self
                .suggester
                .suggest(doctor_id, conflict.start_time, conflict.duration_minutes)
                .await
            {
                Ok(alternatives) => alternatives,
                Err(e) => {
                    warn!(appointment_id = %conflict.id, error = %e, "auto-reschedule: no alternatives found");
                    continue;
                }
            };

            let Some(target) = alternatives.into_iter().next() else {
                warn!(appointment_id = %conflict.id, "auto-reschedule: no alternative slots available");
                continue;
            };

            match self
                .store
                .reschedule_appointment(conflict.id, target.start, target.end)
                .await
            {
                Ok(rescheduled) => {
                    self.dispatcher
                        .dispatch(Self::reminder_event(&rescheduled, NotificationKind::AutoReschedule));

                    self.reminders.cancel(conflict.id).await;
                    let fire_at =
                        rescheduled.start_time - Duration::minutes(rescheduled.reminder_lead_minutes as i64);
                    self.reminders
                        .schedule(
                            rescheduled.id,
                            fire_at,
                            Self::reminder_event(&rescheduled, NotificationKind::Reminder),
                        )
                        .await;
                }
                Err(e) => {
                    warn!(appointment_id = %conflict.id, error = %e, "auto-reschedule: reschedule failed");
                }
            }
        }
    }
}

fn channel_for(reminder_type: ReminderType) -> NotificationChannel {
    match reminder_type {
        ReminderType::Sms => NotificationChannel::Sms,
        ReminderType::Email => NotificationChannel::Email,
        ReminderType::Push => NotificationChannel::Push,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_bounds_match_the_spec() {
        assert_eq!(MIN_DURATION_MINUTES, 15);
        assert_eq!(MAX_DURATION_MINUTES, 180);
    }
}
