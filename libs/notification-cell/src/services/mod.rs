pub mod dispatcher;
pub mod reminders;

pub use dispatcher::NotificationDispatcher;
pub use reminders::ReminderScheduler;
