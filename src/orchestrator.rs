use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::JobRepository;
use crate::error::{QueueError, Result};
use crate::job::{Job, JobSpec};
use crate::shutdown::{forced, ShutdownCoordinator, ShutdownSignal};
use crate::worker::{JobWorker, ProcessRunner, WorkerReport};

/// How a run ended, mapped onto the process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every worker ran out of pending jobs
    Completed,
    /// A first signal stopped claiming; in-flight jobs finished
    Drained,
    /// A second signal killed in-flight jobs
    Forced,
}

impl RunOutcome {
    pub const EXIT_FAILURE: u8 = 1;

    /// Stable exit status for each outcome
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::Drained => 130,
            RunOutcome::Forced => 137,
        }
    }
}

/// Result of a whole run: outcome, per-worker tallies and the final queue
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub workers: Vec<WorkerReport>,
    pub jobs: Vec<Job>,
}

/// Wires the store, the worker pool and shutdown handling together
pub struct Orchestrator {
    config: Config,
    seed: Vec<JobSpec>,
}

impl Orchestrator {
    pub fn new(config: Config, seed: Vec<JobSpec>) -> Self {
        Self { config, seed }
    }

    /// Run with SIGINT/SIGTERM wired to a two-stage shutdown
    pub async fn run(self) -> Result<RunReport> {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let listener = coordinator.listen_for_signals()?;

        let result = self.run_with(Arc::clone(&coordinator)).await;

        listener.abort();
        result
    }

    /// Run against an externally driven shutdown coordinator
    ///
    /// Startup: open store → sweep stale jobs → seed if empty → run the
    /// worker pool to completion → close store. The store is closed on
    /// every path once it has been opened.
    pub async fn run_with(self, coordinator: Arc<ShutdownCoordinator>) -> Result<RunReport> {
        let repository = JobRepository::initialize(
            &self.config.database_url,
            self.config.max_db_connections,
            self.config.reset_on_start,
        )
        .await?;

        let result = self.drive(&repository, &coordinator).await;

        repository.close().await;
        result
    }

    async fn drive(
        &self,
        repository: &JobRepository,
        coordinator: &Arc<ShutdownCoordinator>,
    ) -> Result<RunReport> {
        let swept = repository.sweep_stale(self.config.stale_threshold).await?;
        if swept > 0 {
            info!("Recovered {} stale jobs from a previous run", swept);
        }

        repository.seed(&self.seed).await?;

        let sweeper = self
            .config
            .sweep_interval
            .map(|interval| spawn_sweeper(repository.clone(), interval, self.config.stale_threshold));

        let pool_result = self.run_pool(repository, coordinator).await;

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        let workers = pool_result?;

        let outcome = match coordinator.state() {
            ShutdownSignal::Running => RunOutcome::Completed,
            ShutdownSignal::Drain => RunOutcome::Drained,
            ShutdownSignal::Force => RunOutcome::Forced,
        };

        for (status, count) in repository.counts().await? {
            info!("  - {}: {}", status, count);
        }
        let jobs = repository.list().await?;

        info!("Run finished: {:?}", outcome);
        Ok(RunReport {
            outcome,
            workers,
            jobs,
        })
    }

    /// Start the fixed pool and wait for every worker to stop
    ///
    /// A worker error requests a drain so the rest stop cleanly; the first
    /// error is returned once all of them have. After a forced shutdown,
    /// workers that have not stopped within the grace period are aborted,
    /// which kills their child processes.
    async fn run_pool(
        &self,
        repository: &JobRepository,
        coordinator: &Arc<ShutdownCoordinator>,
    ) -> Result<Vec<WorkerReport>> {
        let runner = ProcessRunner::new();
        let mut workers = JoinSet::new();

        for worker_id in 1..=self.config.num_workers {
            let worker = JobWorker::new(
                format!("worker-{}", worker_id),
                repository.clone(),
                runner.clone(),
                coordinator.subscribe(),
            );
            workers.spawn(worker.run());
            info!("Spawned worker {}", worker_id);
        }

        // Created once so the grace period is not restarted by every worker that exits
        let grace = grace_after_force(coordinator.subscribe(), self.config.force_grace);
        tokio::pin!(grace);
        let mut aborted = false;
        let mut first_error: Option<QueueError> = None;
        let mut reports = Vec::with_capacity(self.config.num_workers);

        loop {
            tokio::select! {
                joined = workers.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok(report))) => reports.push(report),
                    Some(Ok(Err(e))) => {
                        error!("Worker failed: {}", e);
                        coordinator.request_drain();
                        first_error.get_or_insert(e);
                    }
                    Some(Err(join_error)) if join_error.is_cancelled() => {
                        warn!("Worker aborted after forced shutdown");
                    }
                    Some(Err(join_error)) => {
                        error!("Worker task panicked: {}", join_error);
                        coordinator.request_drain();
                        first_error.get_or_insert(QueueError::WorkerPanicked(join_error.to_string()));
                    }
                },
                () = &mut grace, if !aborted => {
                    warn!("Workers still running {:?} after forced shutdown, aborting", self.config.force_grace);
                    workers.abort_all();
                    aborted = true;
                }
            }
        }

        info!("All workers stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }
}

async fn grace_after_force(mut rx: watch::Receiver<ShutdownSignal>, grace: Duration) {
    forced(&mut rx).await;
    tokio::time::sleep(grace).await;
}

/// Periodically fail running jobs older than `threshold`
fn spawn_sweeper(repository: JobRepository, interval: Duration, threshold: Duration) -> JoinHandle<()> {
    info!("Periodic staleness sweep every {:?}", interval);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately and the startup sweep already ran
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = repository.sweep_stale(threshold).await {
                error!("Periodic staleness sweep failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            RunOutcome::Completed.exit_code(),
            RunOutcome::Drained.exit_code(),
            RunOutcome::Forced.exit_code(),
            RunOutcome::EXIT_FAILURE,
        ];
        assert_eq!(codes[0], 0);
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
