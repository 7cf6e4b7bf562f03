pub mod listing;
pub mod models;
pub mod seed;

// Re-export commonly used types
pub use models::{Job, JobSpec, JobStatus};
