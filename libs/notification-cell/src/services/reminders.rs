use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::NotificationEvent;
use crate::services::dispatcher::NotificationDispatcher;

/// One-shot reminder timers keyed by appointment id. `schedule` registers a detached
/// `tokio::time::sleep` that fires the dispatcher at `start - lead`; `cancel` aborts the
/// pending handle if the reminder has not fired yet.
pub struct ReminderScheduler {
    dispatcher: NotificationDispatcher,
    handles: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl ReminderScheduler {
    pub fn new(dispatcher: NotificationDispatcher) -> Self {
        Self {
            dispatcher,
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn schedule(&self, appointment_id: Uuid, fire_at: DateTime<Utc>, event: NotificationEvent) {
        let delay = (fire_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(0));

        let dispatcher = self.dispatcher.clone();
        let handles = self.handles.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            dispatcher.dispatch(event);
            handles.lock().await.remove(&appointment_id);
        });

        if let Some(previous) = self.handles.lock().await.insert(appointment_id, handle) {
            previous.abort();
            debug!("replaced pending reminder for appointment {}", appointment_id);
        }
    }

    pub async fn cancel(&self, appointment_id: Uuid) {
        if let Some(handle) = self.handles.lock().await.remove(&appointment_id) {
            handle.abort();
        } else {
            warn!("no pending reminder to cancel for appointment {}", appointment_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationChannel, NotificationKind};
    use chrono::Duration;

    fn event(appointment_id: Uuid) -> NotificationEvent {
        NotificationEvent {
            kind: NotificationKind::Reminder,
            recipient: "patient@example.com".to_string(),
            channel: NotificationChannel::Email,
            appointment_id: Some(appointment_id),
            doctor_id: None,
            scheduled_start: None,
            detail: None,
        }
    }

    #[tokio::test]
    async fn cancel_aborts_a_pending_reminder() {
        let scheduler = ReminderScheduler::new(NotificationDispatcher::new());
        let appointment_id = Uuid::new_v4();

        scheduler
            .schedule(appointment_id, Utc::now() + Duration::seconds(60), event(appointment_id))
            .await;
        assert!(scheduler.handles.lock().await.contains_key(&appointment_id));

        scheduler.cancel(appointment_id).await;
        assert!(!scheduler.handles.lock().await.contains_key(&appointment_id));
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_previous_timer() {
        let scheduler = ReminderScheduler::new(NotificationDispatcher::new());
        let appointment_id = Uuid::new_v4();

        scheduler
            .schedule(appointment_id, Utc::now() + Duration::seconds(60), event(appointment_id))
            .await;
        scheduler
            .schedule(appointment_id, Utc::now() + Duration::seconds(120), event(appointment_id))
            .await;

        assert_eq!(scheduler.handles.lock().await.len(), 1);
    }
}
