use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::Config;

/// Persistent single-node job queue backed by SQLite
#[derive(Debug, Parser)]
#[command(name = "job-queue", version, about)]
pub struct Cli {
    /// SQLite database URL (overrides DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Seed the queue if empty and run the worker pool until it drains
    Run(RunArgs),
    /// Print every job in the queue without modifying it
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Append a pending job to the queue
    Enqueue {
        /// Executable to run
        command: String,
        /// Arguments passed to the executable
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Number of concurrent workers (overrides NUM_WORKERS)
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Fail running jobs older than this many seconds (overrides STALE_THRESHOLD_SECS)
    #[arg(long)]
    pub stale_threshold_secs: Option<u64>,

    /// Also sweep periodically at this interval (overrides SWEEP_INTERVAL_SECS)
    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,

    /// Keep the existing queue instead of recreating it
    #[arg(long)]
    pub keep_queue: bool,

    /// JSON file with the jobs to seed: [{"command": "echo", "args": ["hi"]}]
    #[arg(long)]
    pub seed_file: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of the environment config
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.database_url {
            config.database_url = url.clone();
        }

        if let Some(Command::Run(args)) = &self.command {
            if let Some(workers) = args.workers {
                config.num_workers = workers;
            }
            if let Some(secs) = args.stale_threshold_secs {
                config.stale_threshold = Duration::from_secs(secs);
            }
            if let Some(secs) = args.sweep_interval_secs {
                config.sweep_interval = Some(Duration::from_secs(secs));
            }
            if args.keep_queue {
                config.reset_on_start = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_override_config() {
        let cli = Cli::parse_from([
            "job-queue",
            "--database-url",
            "sqlite://other.db",
            "run",
            "--workers",
            "7",
            "--keep-queue",
            "--sweep-interval-secs",
            "30",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.database_url, "sqlite://other.db");
        assert_eq!(config.num_workers, 7);
        assert!(!config.reset_on_start);
        assert_eq!(config.sweep_interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn workers_flag_rescues_invalid_env_value() {
        // NUM_WORKERS=0 in the environment, overridden on the command line
        let mut config = Config {
            num_workers: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        Cli::parse_from(["job-queue", "run", "--workers", "2"]).apply(&mut config);
        assert_eq!(config.num_workers, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn no_subcommand_leaves_config_alone() {
        let cli = Cli::parse_from(["job-queue"]);
        assert!(cli.command.is_none());
        let mut config = Config::default();
        cli.apply(&mut config);
        assert!(config.reset_on_start);
    }

    #[test]
    fn enqueue_accepts_hyphenated_args() {
        let cli = Cli::parse_from(["job-queue", "enqueue", "ls", "-la", "/tmp"]);
        match cli.command {
            Some(Command::Enqueue { command, args }) => {
                assert_eq!(command, "ls");
                assert_eq!(args, vec!["-la", "/tmp"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
