//! Single-node persistent job queue.
//!
//! Jobs (a command plus arguments) live in a SQLite table. A fixed pool of
//! workers claims them oldest-first, runs each as a child process and writes
//! the result back. Claims are exclusive through SQLite's single-writer
//! transactions; stuck jobs are recovered by a staleness sweep; SIGINT and
//! SIGTERM drive a two-stage shutdown.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod job;
pub mod logging;
pub mod orchestrator;
pub mod shutdown;
pub mod worker;

pub use config::Config;
pub use db::JobRepository;
pub use error::{QueueError, Result};
pub use job::{Job, JobSpec, JobStatus};
pub use orchestrator::{Orchestrator, RunOutcome, RunReport};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
