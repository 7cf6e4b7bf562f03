use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use job_queue::cli::{Cli, Command, RunArgs};
use job_queue::job::listing::render_listing;
use job_queue::job::seed::{demo_jobs, load_seed_file};
use job_queue::{logging, Config, JobRepository, JobSpec, Orchestrator, Result, RunOutcome};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration from environment, then apply command-line overrides
    let config = match Config::from_env().and_then(|mut config| {
        cli.apply(&mut config);
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("job-queue: {}", e);
            return ExitCode::from(RunOutcome::EXIT_FAILURE);
        }
    };

    if let Err(e) = logging::init(&config.log_dir) {
        eprintln!("job-queue: failed to initialize logging in {}: {}", config.log_dir.display(), e);
        return ExitCode::from(RunOutcome::EXIT_FAILURE);
    }

    let result = match cli.command {
        None => run(config, RunArgs::default()).await,
        Some(Command::Run(args)) => run(config, args).await,
        Some(Command::List { json }) => list(&config, json).await,
        Some(Command::Enqueue { command, args }) => {
            enqueue(&config, JobSpec::new(command, args)).await
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("Fatal: {}", e);
            ExitCode::from(RunOutcome::EXIT_FAILURE)
        }
    }
}

async fn run(config: Config, args: RunArgs) -> Result<u8> {
    info!("Starting job-queue");
    info!("Configuration loaded successfully:");
    info!("  - Database: {}", config.database_url);
    info!("  - Number of workers: {}", config.num_workers);
    info!("  - Stale threshold: {:?}", config.stale_threshold);
    info!("  - Periodic sweep: {:?}", config.sweep_interval);
    info!("  - Reset queue on start: {}", config.reset_on_start);

    let seed = match &args.seed_file {
        Some(path) => load_seed_file(path)?,
        None => demo_jobs(),
    };

    let report = Orchestrator::new(config, seed).run().await?;

    print!("{}", render_listing(&report.jobs));
    Ok(report.outcome.exit_code())
}

async fn list(config: &Config, json: bool) -> Result<u8> {
    let repository = JobRepository::initialize(&config.database_url, 1, false).await?;
    let jobs = repository.list().await;
    repository.close().await;
    let jobs = jobs?;

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
    } else {
        print!("{}", render_listing(&jobs));
    }
    Ok(0)
}

async fn enqueue(config: &Config, spec: JobSpec) -> Result<u8> {
    let repository = JobRepository::initialize(&config.database_url, 1, false).await?;
    let job = repository.enqueue(&spec).await;
    repository.close().await;
    let job = job?;

    println!("Enqueued job {}: {}", job.id, job.command_line());
    Ok(0)
}
