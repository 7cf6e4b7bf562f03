use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::shutdown::{forced, ShutdownSignal};

/// Exit code recorded when the command could not be launched at all
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Exit code recorded when a forced shutdown killed the child (128 + SIGKILL)
pub const FORCED_KILL_EXIT_CODE: i32 = 137;

/// Once the child is gone, pipe readers still blocked (a background
/// grandchild can hold the pipe open) are abandoned after this long and
/// whatever they captured is kept
const OUTPUT_DRAIN_LIMIT: Duration = Duration::from_secs(1);

/// What a finished child process left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    fn spawn_failure(command: &str, err: &std::io::Error) -> Self {
        Self {
            exit_code: SPAWN_FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: format!("failed to spawn '{}': {}", command, err),
        }
    }
}

/// Executes job commands as child processes
///
/// Commands are exec'd directly with their argument vector; there is no
/// shell in between.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `command` with `args` to completion and capture its output
    ///
    /// The child is spawned in its own process group with kill-on-drop, so
    /// if this future is dropped (task abort, cancellation) the process is
    /// killed with it. If the shutdown state reaches `Force` while the child
    /// runs, it is killed immediately and reported with
    /// [`FORCED_KILL_EXIT_CODE`].
    pub async fn run(
        &self,
        command: &str,
        args: &[String],
        mut shutdown: watch::Receiver<ShutdownSignal>,
    ) -> ProcessOutcome {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // A terminal Ctrl+C signals the whole foreground process group; in
        // their own group children only die by an explicit kill
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn '{}': {}", command, e);
                return ProcessOutcome::spawn_failure(command, &e);
            }
        };

        debug!("Spawned '{}' with pid {:?}", command, child.id());

        // Both pipes are drained concurrently so a chatty stderr cannot
        // block the child while stdout is being read
        let stdout = PipeCapture::start(child.stdout.take());
        let stderr = PipeCapture::start(child.stderr.take());

        tokio::select! {
            status = child.wait() => {
                let (stdout, stderr) = tokio::join!(
                    stdout.finish(OUTPUT_DRAIN_LIMIT),
                    stderr.finish(OUTPUT_DRAIN_LIMIT)
                );
                match status {
                    Ok(status) => ProcessOutcome {
                        exit_code: exit_code_of(status),
                        stdout,
                        stderr,
                    },
                    Err(e) => {
                        error!("Failed to wait on '{}': {}", command, e);
                        ProcessOutcome {
                            exit_code: SPAWN_FAILURE_EXIT_CODE,
                            stdout,
                            stderr: format!("{}failed to wait on '{}': {}", stderr, command, e),
                        }
                    }
                }
            }
            () = forced(&mut shutdown) => {
                warn!("Forced shutdown: killing '{}' (pid {:?})", command, child.id());
                if let Err(e) = child.kill().await {
                    error!("Failed to kill '{}': {}", command, e);
                }
                let (stdout, mut stderr) = tokio::join!(
                    stdout.finish(OUTPUT_DRAIN_LIMIT),
                    stderr.finish(OUTPUT_DRAIN_LIMIT)
                );
                if !stderr.is_empty() && !stderr.ends_with('\n') {
                    stderr.push('\n');
                }
                stderr.push_str("killed: forced shutdown");
                ProcessOutcome {
                    exit_code: FORCED_KILL_EXIT_CODE,
                    stdout,
                    stderr,
                }
            }
        }
    }
}

/// Output captured from one child pipe by a background reader
///
/// The buffer is shared with the reader so that output read before the
/// reader is abandoned is not lost with it.
struct PipeCapture {
    captured: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl PipeCapture {
    fn start<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let reader = tokio::spawn(drain(pipe, Arc::clone(&captured)));
        Self { captured, reader }
    }

    /// Wait up to `limit` for the pipe to close, then take what was read
    async fn finish(self, limit: Duration) -> String {
        let abort = self.reader.abort_handle();
        if tokio::time::timeout(limit, self.reader).await.is_err() {
            debug!("Output pipe still open after {:?}, keeping partial output", limit);
            abort.abort();
        }

        let bytes = self.captured.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Append everything written to a pipe to `captured` until it closes
async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>, captured: Arc<Mutex<Vec<u8>>>) {
    let Some(mut reader) = pipe else {
        return;
    };

    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                captured
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]);
            }
            Err(e) => {
                warn!("Error reading child output: {}", e);
                break;
            }
        }
    }
}

/// Real exit code, or 128 + signal number for a child killed by a signal
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
