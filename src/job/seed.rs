use std::path::Path;

use rand::Rng;

use crate::error::Result;
use super::models::JobSpec;

/// Demo jobs seeded into an empty queue when no seed file is given
///
/// Sleep durations are randomised (1-3 seconds) so completion times
/// interleave across the pool.
pub fn demo_jobs() -> Vec<JobSpec> {
    let mut rng = rand::thread_rng();
    let mut sleep = || JobSpec::new("sleep", [rng.gen_range(1..=3).to_string()]);

    vec![
        JobSpec::new("echo", ["hello from the job queue"]),
        sleep(),
        JobSpec::new("ls", ["-la"]),
        sleep(),
        JobSpec::new("date", Vec::<String>::new()),
        JobSpec::new("false", Vec::<String>::new()),
        sleep(),
        JobSpec::new("uname", ["-a"]),
    ]
}

/// Load seed jobs from a JSON array of `{"command": ..., "args": [...]}`
pub fn load_seed_file(path: &Path) -> Result<Vec<JobSpec>> {
    let file = std::fs::File::open(path)?;
    let specs: Vec<JobSpec> = serde_json::from_reader(std::io::BufReader::new(file))?;
    for spec in &specs {
        spec.check()?;
    }
    Ok(specs)
}
