use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("validation error: {0}")]
    Validation(String),
}
