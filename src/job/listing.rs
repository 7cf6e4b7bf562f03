use chrono::{DateTime, Utc};

use super::models::Job;

const COMMAND_WIDTH: usize = 32;
const OUTPUT_WIDTH: usize = 40;

/// Render jobs as a plain-text table, one row per job
pub fn render_listing(jobs: &[Job]) -> String {
    if jobs.is_empty() {
        return "No jobs in queue\n".to_string();
    }

    let mut out = format!(
        "{:>4}  {:<7}  {:>4}  {:<width$}  {:<8}  {:<8}  {}\n",
        "ID",
        "STATUS",
        "EXIT",
        "COMMAND",
        "STARTED",
        "FINISHED",
        "OUTPUT",
        width = COMMAND_WIDTH,
    );

    for job in jobs {
        let exit = job
            .exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:>4}  {:<7}  {:>4}  {:<width$}  {:<8}  {:<8}  {}\n",
            job.id,
            job.status,
            exit,
            truncate(&job.command_line(), COMMAND_WIDTH),
            clock(job.started_at),
            clock(job.finished_at),
            truncate(&output_summary(job), OUTPUT_WIDTH),
            width = COMMAND_WIDTH,
        ));
    }

    out
}

/// First non-empty line of stdout, falling back to stderr
fn output_summary(job: &Job) -> String {
    [job.stdout.as_deref(), job.stderr.as_deref()]
        .into_iter()
        .flatten()
        .flat_map(str::lines)
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string()
}

fn clock(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut cut: String = s.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}
