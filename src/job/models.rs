use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{QueueError, Result};
use crate::worker::ProcessOutcome;

/// Job status enum representing the state of a job
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    /// `done` and `failed` are final; no transition leaves them
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// A command to enqueue, before the store assigns it an id
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Validate)]
pub struct JobSpec {
    #[validate(length(min = 1, message = "Command must not be empty"))]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl JobSpec {
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Run validator checks, flattening the messages into one error
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(|validation_errors| {
            let messages: Vec<String> = validation_errors
                .field_errors()
                .values()
                .flat_map(|errors| {
                    errors.iter().map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| "Validation error".to_string())
                    })
                })
                .collect();
            QueueError::InvalidJob(messages.join(", "))
        })
    }
}

/// A job as stored in the queue, with its full lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: i64,
    pub command: String,
    pub args: Vec<String>,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl Job {
    /// Turn a claimed job into its terminal state from a process outcome
    pub fn complete(self, outcome: ProcessOutcome, finished_at: DateTime<Utc>) -> Job {
        let status = if outcome.succeeded() {
            JobStatus::Done
        } else {
            JobStatus::Failed
        };

        Job {
            status,
            finished_at: Some(finished_at),
            exit_code: Some(outcome.exit_code),
            stdout: Some(outcome.stdout),
            stderr: Some(outcome.stderr),
            ..self
        }
    }

    /// Check the timestamp invariants that tie `started_at`/`finished_at`
    /// to the status
    pub fn check_lifecycle(&self) -> std::result::Result<(), String> {
        let started = self.started_at.is_some();
        let finished = self.finished_at.is_some();

        match self.status {
            JobStatus::Pending if started || finished => {
                Err("pending job carries timestamps".to_string())
            }
            JobStatus::Running if !started || finished => {
                Err("running job must have started_at and no finished_at".to_string())
            }
            JobStatus::Done | JobStatus::Failed if !started || !finished => {
                Err(format!("{} job must have started_at and finished_at", self.status))
            }
            _ => Ok(()),
        }
    }

    /// The command line as it would be typed, for logs and listings
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
