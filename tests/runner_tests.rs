mod common;

use std::time::{Duration, Instant};

use job_queue::worker::runner::{FORCED_KILL_EXIT_CODE, SPAWN_FAILURE_EXIT_CODE};
use job_queue::worker::ProcessRunner;
use job_queue::ShutdownCoordinator;

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn test_run_captures_stdout() {
    let coordinator = ShutdownCoordinator::new();
    let outcome = ProcessRunner::new()
        .run("echo", &args(&["hello", "world"]), coordinator.subscribe())
        .await;

    assert!(outcome.succeeded());
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.stdout, "hello world\n");
    assert!(outcome.stderr.is_empty());
}

#[tokio::test]
async fn test_run_reports_non_zero_exit() {
    let coordinator = ShutdownCoordinator::new();
    let outcome = ProcessRunner::new()
        .run("false", &[], coordinator.subscribe())
        .await;

    assert!(!outcome.succeeded());
    assert_eq!(outcome.exit_code, 1);
}

#[tokio::test]
async fn test_run_captures_stderr_and_exit_code() {
    let coordinator = ShutdownCoordinator::new();
    let outcome = ProcessRunner::new()
        .run(
            "sh",
            &args(&["-c", "echo out; echo oops >&2; exit 3"]),
            coordinator.subscribe(),
        )
        .await;

    assert_eq!(outcome.exit_code, 3);
    assert_eq!(outcome.stdout, "out\n");
    assert_eq!(outcome.stderr, "oops\n");
}

#[tokio::test]
async fn test_arguments_are_not_shell_interpreted() {
    let coordinator = ShutdownCoordinator::new();
    let outcome = ProcessRunner::new()
        .run("echo", &args(&["$HOME", "a;b"]), coordinator.subscribe())
        .await;

    assert_eq!(outcome.stdout, "$HOME a;b\n");
}

#[tokio::test]
async fn test_large_output_is_fully_captured() {
    let coordinator = ShutdownCoordinator::new();
    let outcome = ProcessRunner::new()
        .run("seq", &args(&["1", "20000"]), coordinator.subscribe())
        .await;

    assert!(outcome.succeeded());
    assert_eq!(outcome.stdout.lines().count(), 20000);
    assert_eq!(outcome.stdout.lines().last(), Some("20000"));
}

#[tokio::test]
async fn test_missing_executable_is_a_failed_outcome() {
    let coordinator = ShutdownCoordinator::new();
    let outcome = ProcessRunner::new()
        .run("definitely-not-a-real-command-4821", &[], coordinator.subscribe())
        .await;

    assert!(!outcome.succeeded());
    assert_eq!(outcome.exit_code, SPAWN_FAILURE_EXIT_CODE);
    assert!(outcome.stderr.contains("failed to spawn"));
    assert!(outcome.stdout.is_empty());
}

#[tokio::test]
async fn test_drain_lets_running_process_finish() {
    let coordinator = ShutdownCoordinator::new();
    coordinator.request_drain();

    let outcome = ProcessRunner::new()
        .run("sh", &args(&["-c", "sleep 0.2; echo finished"]), coordinator.subscribe())
        .await;

    assert!(outcome.succeeded());
    assert_eq!(outcome.stdout, "finished\n");
}

#[tokio::test]
async fn test_force_kills_running_process() {
    let coordinator = std::sync::Arc::new(ShutdownCoordinator::new());
    let rx = coordinator.subscribe();

    let run = tokio::spawn(async move {
        ProcessRunner::new()
            .run("sleep", &args(&["30"]), rx)
            .await
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    coordinator.request_force();

    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("forced run should end promptly")
        .unwrap();

    assert!(!outcome.succeeded());
    assert_eq!(outcome.exit_code, FORCED_KILL_EXIT_CODE);
    assert!(outcome.stderr.contains("killed: forced shutdown"));
}

#[tokio::test]
async fn test_background_grandchild_does_not_hold_up_the_result() {
    let coordinator = ShutdownCoordinator::new();
    let started = Instant::now();

    // The backgrounded sleep inherits stdout and keeps the pipe open after sh exits
    let outcome = ProcessRunner::new()
        .run("sh", &args(&["-c", "sleep 5 & echo $!"]), coordinator.subscribe())
        .await;

    assert!(
        started.elapsed() < Duration::from_secs(4),
        "run waited {:?} for an orphaned pipe",
        started.elapsed()
    );
    assert!(outcome.succeeded());

    let grandchild: u32 = outcome.stdout.trim().parse().expect("pid on stdout");
    common::kill_process(grandchild);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_child_runs_in_its_own_process_group() {
    let coordinator = ShutdownCoordinator::new();
    let outcome = ProcessRunner::new()
        .run(
            "sh",
            &args(&["-c", "echo $$; cut -d' ' -f5 /proc/$$/stat"]),
            coordinator.subscribe(),
        )
        .await;
    assert!(outcome.succeeded(), "stderr: {}", outcome.stderr);

    let ids: Vec<u32> = outcome
        .stdout
        .lines()
        .map(|line| line.trim().parse().expect("numeric id"))
        .collect();
    let (pid, pgid) = (ids[0], ids[1]);
    assert_eq!(pgid, pid, "child should lead its own process group");

    // So a Ctrl+C delivered to the queue's group never reaches it
    let own_group = common::process_group_of(std::process::id()).unwrap();
    assert_ne!(pgid, own_group);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_cancelled_run_kills_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("child.pid");
    let coordinator = ShutdownCoordinator::new();
    let rx = coordinator.subscribe();
    let script = args(&[
        "-c",
        "echo $$ > \"$0\"; exec sleep 30",
        pid_file.to_str().unwrap(),
    ]);

    let run = tokio::spawn(async move { ProcessRunner::new().run("sh", &script, rx).await });

    let pid = common::read_pid_file(&pid_file).await;
    assert!(common::process_is_alive(pid));

    run.abort();
    assert!(run.await.unwrap_err().is_cancelled());

    common::wait_for_process_exit(pid).await;
}
