#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use job_queue::{Config, Job, JobRepository, JobStatus};
use tempfile::TempDir;

/// A SQLite file in a temporary directory, removed on drop
pub struct TestDb {
    _dir: TempDir,
    pub url: String,
}

pub fn temp_db() -> TestDb {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = format!("sqlite://{}", dir.path().join("jobs.db").display());
    TestDb { _dir: dir, url }
}

pub async fn open_store(db: &TestDb) -> JobRepository {
    JobRepository::initialize(&db.url, 4, true)
        .await
        .expect("open store")
}

/// Open a second handle on an existing queue without resetting it
pub async fn observe_store(db: &TestDb) -> JobRepository {
    JobRepository::initialize(&db.url, 2, false)
        .await
        .expect("open observer")
}

pub fn test_config(db: &TestDb, num_workers: usize) -> Config {
    Config {
        database_url: db.url.clone(),
        num_workers,
        force_grace: Duration::from_secs(2),
        ..Config::default()
    }
}

/// Poll until job `id` reaches `status`
pub async fn wait_for_status(store: &JobRepository, id: i64, status: JobStatus) -> Job {
    let poll = async {
        loop {
            if let Ok(jobs) = store.list().await {
                if let Some(job) = jobs.into_iter().find(|job| job.id == id && job.status == status) {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), poll)
        .await
        .unwrap_or_else(|_| panic!("job {} never reached {}", id, status))
}

/// started_at is set iff the job left pending; finished_at iff terminal
pub fn assert_lifecycle(job: &Job) {
    assert_eq!(
        job.started_at.is_some(),
        job.status != JobStatus::Pending,
        "started_at invariant broken for {:?}",
        job
    );
    assert_eq!(
        job.finished_at.is_some(),
        job.status.is_terminal(),
        "finished_at invariant broken for {:?}",
        job
    );
}

/// Wait for a job's shell to write a pid into `path`
pub async fn read_pid_file(path: &Path) -> u32 {
    let poll = async {
        loop {
            if let Ok(contents) = tokio::fs::read_to_string(path).await {
                if let Ok(pid) = contents.trim().parse() {
                    return pid;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), poll)
        .await
        .unwrap_or_else(|_| panic!("no pid written to {}", path.display()))
}

/// A process counts as gone once it has exited, even if not yet reaped
#[cfg(target_os = "linux")]
pub fn process_is_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // The state letter follows the parenthesised command name
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.trim_start().chars().next())
            .is_some_and(|state| state != 'Z'),
        Err(_) => false,
    }
}

/// Process group id of `pid`, from /proc
#[cfg(target_os = "linux")]
pub fn process_group_of(pid: u32) -> Option<u32> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // After the command name: state, ppid, pgrp
    stat.rsplit(')').next()?.split_whitespace().nth(2)?.parse().ok()
}

#[cfg(target_os = "linux")]
pub async fn wait_for_process_exit(pid: u32) {
    let poll = async {
        while process_is_alive(pid) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .unwrap_or_else(|_| panic!("process {} is still alive", pid))
}

/// Best-effort cleanup of a process a test left behind
pub fn kill_process(pid: u32) {
    let _ = std::process::Command::new("kill")
        .args(["-KILL", &pid.to_string()])
        .status();
}
