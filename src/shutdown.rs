use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{QueueError, Result};

/// Process-wide shutdown state, observed by workers and process runners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Normal operation
    Running,
    /// First signal: stop claiming, let in-flight jobs finish
    Drain,
    /// Second signal: kill in-flight child processes now
    Force,
}

impl ShutdownSignal {
    pub fn is_requested(&self) -> bool {
        !matches!(self, ShutdownSignal::Running)
    }

    pub fn is_forced(&self) -> bool {
        matches!(self, ShutdownSignal::Force)
    }
}

/// Handles graceful shutdown of the queue
///
/// Owns the OS signal handlers and the `watch` channel that carries the
/// shutdown state to every worker:
/// 1. First SIGINT/SIGTERM (or CTRL+C) moves to `Drain`
/// 2. Any further signal moves to `Force`
///
/// The state only ever escalates; it never returns to `Running`.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    tx: watch::Sender<ShutdownSignal>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ShutdownSignal::Running);
        Self { tx }
    }

    /// A receiver for workers; it sees the current state immediately
    pub fn subscribe(&self) -> watch::Receiver<ShutdownSignal> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> ShutdownSignal {
        *self.tx.borrow()
    }

    /// Stop claiming new jobs; no-op if already draining or forced
    pub fn request_drain(&self) {
        self.tx.send_if_modified(|state| {
            if *state == ShutdownSignal::Running {
                *state = ShutdownSignal::Drain;
                true
            } else {
                false
            }
        });
    }

    /// Kill in-flight jobs immediately
    pub fn request_force(&self) {
        self.tx.send_if_modified(|state| {
            if *state == ShutdownSignal::Force {
                false
            } else {
                *state = ShutdownSignal::Force;
                true
            }
        });
    }

    /// Move one stage further: Running → Drain → Force
    pub fn escalate(&self) -> ShutdownSignal {
        match self.state() {
            ShutdownSignal::Running => self.request_drain(),
            ShutdownSignal::Drain | ShutdownSignal::Force => self.request_force(),
        }
        self.state()
    }

    /// Install SIGINT/SIGTERM handlers and escalate on every signal received
    ///
    /// Handlers are installed before this returns, so a failure surfaces
    /// here rather than inside the background task.
    pub fn listen_for_signals(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint = signal(SignalKind::interrupt()).map_err(QueueError::Signal)?;
            let mut sigterm = signal(SignalKind::terminate()).map_err(QueueError::Signal)?;
            let coordinator = Arc::clone(self);

            Ok(tokio::spawn(async move {
                loop {
                    let name = tokio::select! {
                        received = sigint.recv() => match received {
                            Some(()) => "SIGINT",
                            None => break,
                        },
                        received = sigterm.recv() => match received {
                            Some(()) => "SIGTERM",
                            None => break,
                        },
                    };
                    coordinator.on_signal(name);
                }
            }))
        }

        #[cfg(not(unix))]
        {
            let coordinator = Arc::clone(self);
            Ok(tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    coordinator.on_signal("CTRL+C");
                }
            }))
        }
    }

    fn on_signal(&self, name: &str) {
        match self.escalate() {
            ShutdownSignal::Drain => info!(
                "Received {} signal, draining: in-flight jobs will finish, no new jobs will be claimed",
                name
            ),
            ShutdownSignal::Force => warn!(
                "Received {} signal again, forcing shutdown: killing in-flight jobs",
                name
            ),
            ShutdownSignal::Running => {}
        }
    }
}

/// Resolve once the state reaches `Force`; never resolves if the
/// coordinator is dropped first
pub async fn forced(rx: &mut watch::Receiver<ShutdownSignal>) {
    let reached = rx.wait_for(ShutdownSignal::is_forced).await.is_ok();
    if !reached {
        std::future::pending::<()>().await;
    }
}
