pub mod job_worker;
pub mod runner;

pub use job_worker::{JobWorker, WorkerReport, WorkerState};
pub use runner::{ProcessOutcome, ProcessRunner};
