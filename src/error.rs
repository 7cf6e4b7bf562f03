use thiserror::Error;

/// Errors that escape a job and reach the orchestrator.
///
/// Job-level failures (spawn errors, non-zero exits, stale jobs) are never
/// represented here: they become `failed` rows instead.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The store could not be opened or created at startup
    #[error("Job store unavailable: {0}")]
    StoreUnavailable(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A write-back targeted a row that no longer exists
    #[error("Job not found: {0}")]
    NotFound(i64),

    #[error("Malformed job row {id}: {reason}")]
    MalformedRow { id: i64, reason: String },

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Worker task failed: {0}")]
    WorkerPanicked(String),
}

impl QueueError {
    pub fn malformed(id: i64, reason: impl Into<String>) -> Self {
        QueueError::MalformedRow {
            id,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
