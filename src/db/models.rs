use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::FromRow;

use crate::error::QueueError;
use crate::job::{Job, JobStatus};

/// Database representation of a job with all fields, as stored
///
/// Timestamps are RFC 3339 text and `args` is a JSON array; conversion into
/// [`Job`] goes through `TryFrom` so malformed rows never leak further.
#[derive(Debug, FromRow)]
pub struct JobRow {
    pub id: i64,
    pub command: String,
    pub args: String,
    pub status: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// Fixed-width UTC timestamp, so text comparison in SQL matches time order
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(id: i64, column: &str, raw: &str) -> Result<DateTime<Utc>, QueueError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| QueueError::malformed(id, format!("{} '{}': {}", column, raw, e)))
}

impl TryFrom<JobRow> for Job {
    type Error = QueueError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let id = row.id;

        if row.command.is_empty() {
            return Err(QueueError::malformed(id, "empty command"));
        }

        let args: Vec<String> = serde_json::from_str(&row.args)
            .map_err(|e| QueueError::malformed(id, format!("args '{}': {}", row.args, e)))?;

        let status: JobStatus = row
            .status
            .parse()
            .map_err(|e: String| QueueError::malformed(id, e))?;

        let started_at = row
            .started_at
            .as_deref()
            .map(|raw| parse_timestamp(id, "started_at", raw))
            .transpose()?;
        let finished_at = row
            .finished_at
            .as_deref()
            .map(|raw| parse_timestamp(id, "finished_at", raw))
            .transpose()?;

        let job = Job {
            id,
            command: row.command,
            args,
            status,
            started_at,
            finished_at,
            exit_code: row.exit_code,
            stdout: row.stdout,
            stderr: row.stderr,
        };

        job.check_lifecycle()
            .map_err(|reason| QueueError::malformed(id, reason))?;

        Ok(job)
    }
}
