use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::db::connection::get_connection;
use crate::db::migrations::{reset_schema, run_migrations};
use crate::db::models::{format_timestamp, JobRow};
use crate::error::{QueueError, Result};
use crate::job::{Job, JobSpec, JobStatus};

const JOB_COLUMNS: &str =
    "id, command, args, status, started_at, finished_at, exit_code, stdout, stderr";

/// Prefix written to `stderr` of jobs failed by the staleness sweep
pub const STALE_JOB_MARKER: &str = "timed out";

/// Repository for Job database operations
///
/// The only writer of job rows. Cloning is cheap and shares the underlying
/// connection pool, so every worker holds its own handle.
#[derive(Clone, Debug)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    /// Open (or create) the store, enable WAL and ensure the schema exists
    ///
    /// With `reset` the jobs table is dropped and recreated, so the queue
    /// starts empty.
    pub async fn initialize(database_url: &str, max_connections: u32, reset: bool) -> Result<Self> {
        let pool = get_connection(database_url, max_connections)
            .await
            .map_err(QueueError::StoreUnavailable)?;

        info!("Database connection pool established: {}", database_url);

        if reset {
            reset_schema(&pool).await?;
        }
        run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Insert `specs` as pending jobs, but only into an empty table
    ///
    /// Returns the number of rows inserted (0 when the table already had jobs).
    pub async fn seed(&self, specs: &[JobSpec]) -> Result<u64> {
        for spec in specs {
            spec.check()?;
        }

        let mut tx = self.pool.begin().await?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&mut *tx)
            .await?;

        if existing > 0 {
            debug!("Seed skipped: table already holds {} jobs", existing);
            tx.commit().await?;
            return Ok(0);
        }

        let mut inserted = 0;
        for spec in specs {
            let args = serde_json::to_string(&spec.args)?;
            inserted += sqlx::query("INSERT INTO jobs (command, args) VALUES (?, ?)")
                .bind(&spec.command)
                .bind(args)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;
        info!("Seeded {} jobs", inserted);
        Ok(inserted)
    }

    /// Append one pending job and return it
    pub async fn enqueue(&self, spec: &JobSpec) -> Result<Job> {
        spec.check()?;

        let args = serde_json::to_string(&spec.args)?;
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "INSERT INTO jobs (command, args) VALUES (?, ?) RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(&spec.command)
        .bind(args)
        .fetch_one(&self.pool)
        .await?;

        debug!("Job enqueued with id={}", row.id);
        Job::try_from(row)
    }

    /// All jobs, oldest first
    pub async fn list(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs ORDER BY id ASC",
            JOB_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    /// Fail every running job that started more than `threshold` ago
    ///
    /// Returns the number of jobs swept.
    pub async fn sweep_stale(&self, threshold: Duration) -> Result<u64> {
        self.sweep_stale_at(threshold, Utc::now()).await
    }

    /// [`sweep_stale`](Self::sweep_stale) against an explicit clock
    pub async fn sweep_stale_at(&self, threshold: Duration, now: DateTime<Utc>) -> Result<u64> {
        let threshold = chrono::Duration::from_std(threshold)
            .map_err(|e| QueueError::Config(format!("stale threshold out of range: {}", e)))?;
        let cutoff = now - threshold;
        let marker = format!(
            "{}: job exceeded the {}s staleness threshold",
            STALE_JOB_MARKER,
            threshold.num_seconds()
        );

        let swept = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', finished_at = ?, stderr = ?
            WHERE status = 'running' AND started_at < ?
            "#,
        )
        .bind(format_timestamp(now))
        .bind(marker)
        .bind(format_timestamp(cutoff))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if swept > 0 {
            warn!("Swept {} stale running jobs into failed", swept);
        } else {
            debug!("Staleness sweep found no stuck jobs");
        }
        Ok(swept)
    }

    /// Atomically move the oldest pending job to running and return it
    ///
    /// The select and the update are one statement inside a transaction, so
    /// SQLite's single writer guarantees no two callers get the same row.
    /// `None` means the queue has no pending work.
    pub async fn claim_next(&self) -> Result<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET status = 'running', started_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE status = 'pending'
                ORDER BY id ASC
                LIMIT 1
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(format_timestamp(Utc::now()))
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        row.map(Job::try_from).transpose()
    }

    /// Write back the terminal state of a finished job
    ///
    /// Only a row still in `running` is written. Returns `false` when the
    /// row has already reached a terminal state (the staleness sweep failed
    /// it while the worker still held it); that result is dropped and the
    /// row keeps its first terminal state. Fails with `NotFound` if the row
    /// has vanished, which can only happen if something outside the queue
    /// deleted it.
    pub async fn update(&self, job: &Job) -> Result<bool> {
        if !job.status.is_terminal() {
            return Err(QueueError::InvalidJob(format!(
                "job {} cannot be written back in state {}",
                job.id, job.status
            )));
        }
        job.check_lifecycle().map_err(QueueError::InvalidJob)?;

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, finished_at = ?, exit_code = ?, stdout = ?, stderr = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.finished_at.map(format_timestamp))
        .bind(job.exit_code)
        .bind(job.stdout.as_deref())
        .bind(job.stderr.as_deref())
        .bind(job.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let current: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
                .bind(job.id)
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;

            return match current {
                None => Err(QueueError::NotFound(job.id)),
                Some(status) => {
                    warn!(
                        "Job {} is already {}, dropping its {} result",
                        job.id, status, job.status
                    );
                    Ok(false)
                }
            };
        }

        tx.commit().await?;
        debug!("Job {} recorded as {}", job.id, job.status);
        Ok(true)
    }

    /// Number of jobs in each status, in lifecycle order
    pub async fn counts(&self) -> Result<Vec<(JobStatus, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = Vec::with_capacity(4);
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Done,
            JobStatus::Failed,
        ] {
            let count = rows
                .iter()
                .find(|(s, _)| s == status.as_str())
                .map(|(_, n)| *n)
                .unwrap_or(0);
            counts.push((status, count));
        }
        Ok(counts)
    }

    /// Close the connection pool
    ///
    /// Consumes the handle; the orchestrator calls this once, after every
    /// worker has stopped.
    pub async fn close(self) {
        info!("Closing database connection pool...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}
