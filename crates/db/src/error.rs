use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("A task with nonce {0} already exists")]
    DuplicateNonce(String),

    #[error("Corrupt {column} column for task {id}: {reason}")]
    Serialization {
        id: String,
        column: &'static str,
        reason: String,
    },
}
