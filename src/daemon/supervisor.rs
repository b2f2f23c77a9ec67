// Daemon child-process supervision
//
// Spawns the sync daemon, relays its running/not-running transitions to a
// callback and force-kills it when the supervisor goes away.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::errors::ConnectorError;

/// Fixed launch arguments: the daemon must neither restart itself nor open a browser
pub const DAEMON_ARGS: [&str; 2] = ["-no-restart", "-no-browser"];

/// Callback receiving `true` when the daemon runs, `false` otherwise
pub type ProcessSpawnedCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Process state as observed by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotRunning,
    Starting,
    Running,
}

impl ProcessState {
    /// Collapse to the binary signal reported to callbacks
    pub fn is_running(self) -> bool {
        matches!(self, ProcessState::Running)
    }
}

struct Tracked {
    state: ProcessState,
    pid: Option<u32>,
    callback: Option<ProcessSpawnedCallback>,
}

/// Supervises exactly one daemon child process
///
/// A second `spawn` is rejected while the tracked child is alive; once it
/// exited, `spawn` starts a new child and tracks that one instead.
pub struct ProcessSupervisor {
    tracked: Arc<Mutex<Tracked>>,
    log_file: Option<PathBuf>,
    /// Asks the watcher task of the current child to kill it
    kill: Option<oneshot::Sender<()>>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            tracked: Arc::new(Mutex::new(Tracked {
                state: ProcessState::NotRunning,
                pid: None,
                callback: None,
            })),
            log_file: None,
            kill: None,
        }
    }

    /// Append the daemon's stdout/stderr to `path` instead of discarding them
    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        self.log_file = path;
        self
    }

    /// Register the state callback, replacing any previous one
    pub fn set_process_state_callback(&self, callback: ProcessSpawnedCallback) {
        lock(&self.tracked).callback = Some(callback);
    }

    pub fn state(&self) -> ProcessState {
        lock(&self.tracked).state
    }

    pub fn pid(&self) -> Option<u32> {
        lock(&self.tracked).pid
    }

    /// Launch the daemon executable with `DAEMON_ARGS`
    ///
    /// Failing to start is not an error: it is reported as a transition to
    /// not-running. Must be called within a Tokio runtime.
    pub fn spawn(&mut self, executable: impl AsRef<Path>) -> Result<(), ConnectorError> {
        let executable = executable.as_ref();
        {
            let tracked = lock(&self.tracked);
            if let (ProcessState::Running, Some(pid)) = (tracked.state, tracked.pid) {
                return Err(ConnectorError::AlreadySpawned(pid));
            }
        }

        transition(&self.tracked, ProcessState::Starting);

        let mut cmd = Command::new(executable);
        cmd.args(DAEMON_ARGS).stdin(Stdio::null());
        // Covers runtime shutdown, where the watcher task is dropped unpolled
        cmd.kill_on_drop(true);

        match self.open_log() {
            Some(log) => match log.try_clone() {
                Ok(stdout) => {
                    cmd.stdout(Stdio::from(stdout)).stderr(Stdio::from(log));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to clone daemon log handle, discarding output");
                    cmd.stdout(Stdio::null()).stderr(Stdio::null());
                }
            },
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(exe = %executable.display(), error = %e, "Failed to start daemon");
                transition(&self.tracked, ProcessState::NotRunning);
                return Ok(());
            }
        };

        let pid = child.id();
        info!(exe = %executable.display(), pid = ?pid, "Daemon process started");
        lock(&self.tracked).pid = pid;
        transition(&self.tracked, ProcessState::Running);

        let (kill_tx, kill_rx) = oneshot::channel();
        self.kill = Some(kill_tx);
        tokio::spawn(watch_child(child, pid, kill_rx, self.tracked.clone()));

        Ok(())
    }

    /// Detach the callback and force-kill the tracked child, if any
    ///
    /// Idempotent: the kill is requested at most once per child. The child
    /// is killed and reaped by its watcher task, so a PID that was already
    /// reaped is never signalled. Does not wait for the child to exit.
    pub fn shutdown(&mut self) {
        let pid = {
            let mut tracked = lock(&self.tracked);
            tracked.callback = None;
            tracked.pid.take()
        };

        let Some(kill) = self.kill.take() else {
            return;
        };
        if pid.is_none() {
            return;
        }
        if kill.send(()).is_err() {
            debug!(pid = ?pid, "Daemon process already gone");
        }
    }

    fn open_log(&self) -> Option<std::fs::File> {
        let path = self.log_file.as_ref()?;
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(log = %path.display(), error = %e, "Failed to open daemon log file");
                None
            }
        }
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock(tracked: &Mutex<Tracked>) -> std::sync::MutexGuard<'_, Tracked> {
    tracked.lock().unwrap_or_else(|e| e.into_inner())
}

/// Record `state` and report it; the callback runs without the lock held
fn transition(tracked: &Mutex<Tracked>, state: ProcessState) {
    let callback = {
        let mut guard = lock(tracked);
        guard.state = state;
        guard.callback.clone()
    };
    debug!(?state, "Daemon process state changed");
    if let Some(callback) = callback {
        callback(state.is_running());
    }
}

/// Wait for the child to exit, or kill it when asked to
///
/// The PID is released only here, after the child was reaped.
async fn watch_child(
    mut child: Child,
    pid: Option<u32>,
    kill: oneshot::Receiver<()>,
    tracked: Arc<Mutex<Tracked>>,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        Ok(()) = kill => None,
    };

    let status = match exited {
        Some(status) => status,
        None => {
            match child.start_kill() {
                Ok(()) => info!(pid = ?pid, "Daemon process killed"),
                Err(e) => warn!(pid = ?pid, error = %e, "Failed to kill daemon process"),
            }
            child.wait().await
        }
    };

    lock(&tracked).pid = None;
    match status {
        Ok(status) => info!(pid = ?pid, %status, "Daemon process exited"),
        Err(e) => warn!(pid = ?pid, error = %e, "Failed to wait for daemon process"),
    }
    transition(&tracked, ProcessState::NotRunning);
}
