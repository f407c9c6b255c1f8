use tracing::{error, info, instrument};

use crate::models::{NotificationChannel, NotificationEvent};

/// Fire-and-forget delivery: every call to `dispatch` spawns a detached task and returns
/// immediately. A delivery failure is logged with the appointment id as a correlation field
/// and never surfaces back to the caller, the same way the teacher's booking worker treated
/// websocket notification failures as non-fatal to the booking result.
#[derive(Clone, Default)]
pub struct NotificationDispatcher;

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, event), fields(kind = ?event.kind, channel = ?event.channel))]
    pub fn dispatch(&self, event: NotificationEvent) {
        tokio::spawn(async move {
            if let Err(e) = deliver(&event).await {
                error!(
                    appointment_id = ?event.appointment_id,
                    "notification delivery failed: {}", e
                );
            }
        });
    }
}

async fn deliver(event: &NotificationEvent) -> Result<(), String> {
    let message = event.render();
    match event.channel {
        NotificationChannel::Sms => deliver_sms(&event.recipient, &message).await,
        NotificationChannel::Email => deliver_email(&event.recipient, &message).await,
        NotificationChannel::Push => deliver_push(&event.recipient, &message).await,
    }
}

// Channel adapters. The dispatcher only renders and routes; it does not speak SMTP/SMPP, so
// these stand in for whatever outbound provider a deployment wires up.

async fn deliver_sms(recipient: &str, message: &str) -> Result<(), String> {
    info!("SMS -> {}: {}", recipient, message);
    Ok(())
}

async fn deliver_email(recipient: &str, message: &str) -> Result<(), String> {
    info!("EMAIL -> {}: {}", recipient, message);
    Ok(())
}

async fn deliver_push(recipient: &str, message: &str) -> Result<(), String> {
    info!("PUSH -> {}: {}", recipient, message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;

    #[tokio::test]
    async fn dispatch_does_not_block_on_delivery() {
        let dispatcher = NotificationDispatcher::new();
        let event = NotificationEvent {
            kind: NotificationKind::Confirmation,
            recipient: "patient@example.com".to_string(),
            channel: NotificationChannel::Email,
            appointment_id: Some(uuid::Uuid::new_v4()),
            doctor_id: None,
            scheduled_start: None,
            detail: None,
        };

        dispatcher.dispatch(event);
    }
}
