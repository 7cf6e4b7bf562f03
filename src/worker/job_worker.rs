use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::db::JobRepository;
use crate::error::Result;
use crate::job::JobStatus;
use crate::shutdown::ShutdownSignal;
use super::runner::ProcessRunner;

/// Where a worker is in its claim/run/record cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Claiming,
    Running,
    Recording,
    Stopped,
}

/// Per-worker tally returned when the loop ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub label: String,
    pub done: u64,
    pub failed: u64,
}

/// Background worker for processing jobs
///
/// Drives one job at a time: claim the oldest pending job, run it, record
/// the result, repeat. Stops when the queue has nothing pending or a
/// shutdown has been requested.
pub struct JobWorker {
    label: String,
    repository: JobRepository,
    runner: ProcessRunner,
    shutdown: watch::Receiver<ShutdownSignal>,
    state: WorkerState,
}

impl JobWorker {
    /// Create a new JobWorker instance
    pub fn new(
        label: impl Into<String>,
        repository: JobRepository,
        runner: ProcessRunner,
        shutdown: watch::Receiver<ShutdownSignal>,
    ) -> Self {
        Self {
            label: label.into(),
            repository,
            runner,
            shutdown,
            state: WorkerState::Idle,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Run until the queue is exhausted or shutdown is requested
    ///
    /// Job failures (non-zero exits, spawn errors, forced kills) are
    /// recorded as `failed` rows and the loop continues. Only store errors
    /// end the loop with `Err`.
    pub async fn run(mut self) -> Result<WorkerReport> {
        info!("Worker {} started", self.label);

        let mut report = WorkerReport {
            label: self.label.clone(),
            done: 0,
            failed: 0,
        };

        let outcome = self.process_jobs(&mut report).await;
        self.transition(WorkerState::Stopped);

        match &outcome {
            Ok(()) => info!(
                "Worker {} stopped: {} done, {} failed",
                self.label, report.done, report.failed
            ),
            Err(e) => error!("Worker {} stopped on error: {}", self.label, e),
        }

        outcome.map(|()| report)
    }

    async fn process_jobs(&mut self, report: &mut WorkerReport) -> Result<()> {
        loop {
            if self.shutdown.borrow().is_requested() {
                info!("Worker {} observed shutdown, not claiming more jobs", self.label);
                return Ok(());
            }

            self.transition(WorkerState::Claiming);
            let Some(job) = self.repository.claim_next().await? else {
                info!("Worker {} found no pending jobs", self.label);
                return Ok(());
            };

            info!(
                "Worker {} claimed job {}: {}",
                self.label,
                job.id,
                job.command_line()
            );

            self.transition(WorkerState::Running);
            let outcome = self
                .runner
                .run(&job.command, &job.args, self.shutdown.clone())
                .await;

            self.transition(WorkerState::Recording);
            let finished = job.complete(outcome, Utc::now());
            if !self.repository.update(&finished).await? {
                warn!(
                    "Worker {} finished job {} after it was already recorded, result discarded",
                    self.label, finished.id
                );
                self.transition(WorkerState::Idle);
                continue;
            }

            match finished.status {
                JobStatus::Done => {
                    report.done += 1;
                    info!("Worker {} completed job {}: status=done", self.label, finished.id);
                }
                _ => {
                    report.failed += 1;
                    warn!(
                        "Worker {} completed job {}: status=failed, exit_code={:?}",
                        self.label, finished.id, finished.exit_code
                    );
                }
            }

            self.transition(WorkerState::Idle);
        }
    }

    fn transition(&mut self, next: WorkerState) {
        debug!("Worker {}: {:?} -> {:?}", self.label, self.state, next);
        self.state = next;
    }
}
