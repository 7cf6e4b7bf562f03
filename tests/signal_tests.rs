#![cfg(unix)]

mod common;

use std::process::Stdio;
use std::time::Duration;

use job_queue::{JobSpec, JobStatus};
use tokio::process::Command;

use common::{observe_store, open_store, temp_db, wait_for_status};

/// Ctrl+C in a terminal sends SIGINT to the whole foreground process group
fn interrupt_group(pgid: u32) {
    let status = std::process::Command::new("sh")
        .args(["-c", &format!("kill -s INT -- -{}", pgid)])
        .status()
        .expect("run kill");
    assert!(status.success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_group_interrupt_drains_in_flight_job() {
    let db = temp_db();
    let logs = tempfile::tempdir().unwrap();

    let store = open_store(&db).await;
    store
        .seed(&[
            JobSpec::new("sh", ["-c", "sleep 1; echo drained-ok"]),
            JobSpec::new("echo", ["never"]),
        ])
        .await
        .unwrap();
    store.close().await;

    // The queue leads its own group here, standing in for a terminal's foreground group
    let mut queue = Command::new(env!("CARGO_BIN_EXE_job-queue"))
        .args(["run", "--keep-queue", "--workers", "1"])
        .env("DATABASE_URL", &db.url)
        .env("LOG_DIR", logs.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .expect("start job-queue");
    let pgid = queue.id().expect("queue pid");

    let observer = observe_store(&db).await;
    wait_for_status(&observer, 1, JobStatus::Running).await;
    interrupt_group(pgid);

    let status = tokio::time::timeout(Duration::from_secs(15), queue.wait())
        .await
        .expect("queue should exit once the job drains")
        .unwrap();
    assert_eq!(status.code(), Some(130));

    let jobs = observer.list().await.unwrap();
    assert_eq!(jobs[0].status, JobStatus::Done, "in-flight job was {:?}", jobs[0]);
    assert_eq!(jobs[0].stdout.as_deref(), Some("drained-ok\n"));
    assert_eq!(jobs[1].status, JobStatus::Pending);
}
