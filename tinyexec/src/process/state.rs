//! Lifecycle state shared between a handle, its supervisor task, and any
//! piped successor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use super::output::Output;
use super::supervisor::is_supported;
use crate::error::{ExecError, NonZeroExitError, Result};
use crate::signal::AbortReason;

/// Signal sent by [`Process::kill`](crate::Process::kill) when none is given.
pub const SIGTERM: i32 = 15;

/// Lifecycle status of a process handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Not launched yet.
    Unspawned,
    /// Launched and not yet reported closed.
    Running,
    /// Closed; the completion signal has fired.
    Closed,
}

impl ProcessStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspawned => "unspawned",
            Self::Running => "running",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A point-in-time snapshot of a handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub command: String,
    pub args: Vec<String>,
    pub pid: Option<u32>,
    pub status: ProcessStatus,
    pub exit_code: Option<i32>,
    pub signal_code: Option<i32>,
    pub aborted: bool,
    pub timed_out: bool,
    pub killed: bool,
}

#[derive(Debug, Clone, Copy)]
struct ExitRecord {
    code: Option<i32>,
    signal: Option<i32>,
}

#[derive(Debug)]
pub(crate) struct ProcessState {
    command: String,
    args: Vec<String>,
    pid: OnceLock<u32>,
    spawned: AtomicBool,
    aborted: AtomicBool,
    timed_out: AtomicBool,
    killed: AtomicBool,
    exit: OnceLock<ExitRecord>,
    error: OnceLock<ExecError>,
    closed: watch::Sender<bool>,
    kill_tx: OnceLock<mpsc::UnboundedSender<i32>>,
}

impl ProcessState {
    pub(crate) fn new(command: String, args: Vec<String>) -> Self {
        Self {
            command,
            args,
            pid: OnceLock::new(),
            spawned: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            timed_out: AtomicBool::new(false),
            killed: AtomicBool::new(false),
            exit: OnceLock::new(),
            error: OnceLock::new(),
            closed: watch::Sender::new(false),
            kill_tx: OnceLock::new(),
        }
    }

    /// Flip the spawn flag. Fails if the handle was already spawned.
    pub(crate) fn begin_spawn(&self) -> Result<()> {
        if self.spawned.swap(true, Ordering::SeqCst) {
            return Err(ExecError::AlreadySpawned);
        }
        Ok(())
    }

    pub(crate) fn is_spawned(&self) -> bool {
        self.spawned.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_running(&self, pid: Option<u32>, kill_tx: mpsc::UnboundedSender<i32>) {
        if let Some(pid) = pid {
            let _ = self.pid.set(pid);
        }
        let _ = self.kill_tx.set(kill_tx);
    }

    /// Record an abort. A timeout abort also becomes the terminal error.
    pub(crate) fn mark_aborted(&self, reason: AbortReason, timeout: Option<Duration>) {
        self.aborted.store(true, Ordering::SeqCst);
        if reason == AbortReason::TimedOut {
            self.timed_out.store(true, Ordering::SeqCst);
            self.fail(ExecError::Timeout(timeout.unwrap_or_default()));
        }
        debug!(command = %self.command, ?reason, "process aborted");
    }

    pub(crate) fn mark_killed(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn record_exit(&self, code: Option<i32>, signal: Option<i32>) {
        let _ = self.exit.set(ExitRecord { code, signal });
    }

    /// Store the terminal error. The first error wins.
    pub(crate) fn fail(&self, err: ExecError) {
        if self.error.set(err).is_err() {
            trace!(command = %self.command, "terminal error already recorded");
        }
    }

    /// Fire the completion signal. Later calls are no-ops.
    pub(crate) fn close(&self) {
        if !self.closed.send_replace(true) {
            trace!(command = %self.command, "process closed");
        }
    }

    pub(crate) async fn wait_closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Forward a kill request to the supervisor.
    ///
    /// Unsupported signal numbers are rejected here. `killed` is set by the
    /// supervisor once the signal is actually delivered.
    pub(crate) fn kill(&self, signal: i32) -> bool {
        if self.is_closed() {
            return false;
        }
        if !is_supported(signal) {
            debug!(command = %self.command, signal, "rejecting unsupported signal");
            return false;
        }
        let Some(tx) = self.kill_tx.get() else {
            return false;
        };
        tx.send(signal).is_ok()
    }

    pub(crate) fn error(&self) -> Option<ExecError> {
        self.error.get().cloned()
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.pid.get().copied()
    }

    pub(crate) fn exit_code(&self) -> Option<i32> {
        self.exit.get().and_then(|exit| exit.code)
    }

    pub(crate) fn signal_code(&self) -> Option<i32> {
        self.exit.get().and_then(|exit| exit.signal)
    }

    pub(crate) fn aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub(crate) fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }

    pub(crate) fn killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub(crate) fn status(&self) -> ProcessStatus {
        if self.is_closed() {
            ProcessStatus::Closed
        } else if self.is_spawned() {
            ProcessStatus::Running
        } else {
            ProcessStatus::Unspawned
        }
    }

    pub(crate) fn info(&self) -> ProcessInfo {
        ProcessInfo {
            command: self.command.clone(),
            args: self.args.clone(),
            pid: self.pid(),
            status: self.status(),
            exit_code: self.exit_code(),
            signal_code: self.signal_code(),
            aborted: self.aborted(),
            timed_out: self.timed_out(),
            killed: self.killed(),
        }
    }
}

/// The producer side of a pipe, as seen by its consumer.
#[derive(Debug, Clone)]
pub(crate) struct UpstreamLink {
    pub(crate) state: Arc<ProcessState>,
    pub(crate) throw_on_error: bool,
}

/// Completion checks shared by every consumption mode.
#[derive(Debug, Clone)]
pub(crate) struct Completion {
    state: Arc<ProcessState>,
    upstream: Option<UpstreamLink>,
    throw_on_error: bool,
}

impl Completion {
    pub(crate) const fn new(
        state: Arc<ProcessState>,
        upstream: Option<UpstreamLink>,
        throw_on_error: bool,
    ) -> Self {
        Self {
            state,
            upstream,
            throw_on_error,
        }
    }

    /// Wait for the upstream (if any) and this process to close, then
    /// surface the first terminal error. Returns the exit code.
    pub(crate) async fn settle(&self) -> Result<Option<i32>> {
        if let Some(upstream) = &self.upstream {
            upstream.state.wait_closed().await;
            if let Some(err) = upstream.state.error() {
                return Err(ExecError::Upstream(Box::new(err)));
            }
            if upstream.throw_on_error {
                if let Some(code) = upstream.state.exit_code().filter(|code| *code != 0) {
                    let err = NonZeroExitError::new(code, upstream.state.info(), None);
                    return Err(ExecError::Upstream(Box::new(err.into())));
                }
            }
        }

        self.state.wait_closed().await;
        match self.state.error() {
            Some(err) => Err(err),
            None => Ok(self.state.exit_code()),
        }
    }

    /// Apply the throw-on-error policy to a settled exit code. Signal
    /// terminations (no exit code) never raise.
    pub(crate) fn check_exit(&self, exit_code: Option<i32>, output: Option<&Output>) -> Result<()> {
        match exit_code {
            Some(code) if self.throw_on_error && code != 0 => {
                Err(NonZeroExitError::new(code, self.state.info(), output.cloned()).into())
            }
            _ => Ok(()),
        }
    }
}
