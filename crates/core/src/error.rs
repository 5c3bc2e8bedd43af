use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid attachment {name}: {reason}")]
    InvalidAttachment { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
