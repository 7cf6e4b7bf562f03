use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{QueueError, Result};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// SQLite database URL
    /// Format: sqlite://PATH/TO/FILE.db
    pub database_url: String,

    /// Maximum number of pooled SQLite connections shared by the workers
    pub max_db_connections: u32,

    /// Number of workers in the pool
    pub num_workers: usize,

    /// A running job whose start is older than this is failed by the sweep
    pub stale_threshold: Duration,

    /// Run the staleness sweep periodically as well as at startup
    pub sweep_interval: Option<Duration>,

    /// Drop and recreate the jobs table on `run`
    pub reset_on_start: bool,

    /// How long workers get to record killed jobs after a forced shutdown
    pub force_grace: Duration,

    /// Directory for the rolling log files
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://jobs.db".to_string(),
            max_db_connections: 5,
            num_workers: 3,
            stale_threshold: Duration::from_secs(10),
            sweep_interval: None,
            reset_on_start: true,
            force_grace: Duration::from_secs(5),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Optional environment variables:
    /// - DATABASE_URL: SQLite connection string (default: sqlite://jobs.db)
    /// - MAX_DB_CONNECTIONS: pool size (default: 5)
    /// - NUM_WORKERS: number of workers (default: 3)
    /// - STALE_THRESHOLD_SECS: staleness threshold (default: 10)
    /// - SWEEP_INTERVAL_SECS: periodic sweep interval (default: unset, startup only)
    /// - RESET_ON_START: recreate the queue on every run (default: true)
    /// - FORCE_GRACE_SECS: grace period after a forced shutdown (default: 5)
    /// - LOG_DIR: log directory (default: logs)
    ///
    /// The result is not validated here: command-line overrides are applied
    /// on top of it first, then the caller runs [`Config::validate`].
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let defaults = Config::default();

        Ok(Config {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            max_db_connections: parse_var("MAX_DB_CONNECTIONS")
                .unwrap_or(defaults.max_db_connections),
            num_workers: parse_var("NUM_WORKERS").unwrap_or(defaults.num_workers),
            stale_threshold: parse_var("STALE_THRESHOLD_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.stale_threshold),
            sweep_interval: parse_var("SWEEP_INTERVAL_SECS").map(Duration::from_secs),
            reset_on_start: parse_var("RESET_ON_START").unwrap_or(defaults.reset_on_start),
            force_grace: parse_var("FORCE_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.force_grace),
            log_dir: env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(QueueError::Config(
                "NUM_WORKERS must be at least 1".to_string(),
            ));
        }
        if self.max_db_connections == 0 {
            return Err(QueueError::Config(
                "MAX_DB_CONNECTIONS must be at least 1".to_string(),
            ));
        }
        if self.sweep_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(QueueError::Config(
                "SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Missing or unparseable values fall back to the caller's default
fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
