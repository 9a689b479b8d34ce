//! The task that owns a spawned child until it closes.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;
use tracing::{debug, trace, warn};

use super::state::{ProcessState, SIGTERM};
use crate::error::ExecError;
use crate::signal::AbortSignal;

/// Own `child` until it exits, serving abort and kill requests meanwhile.
///
/// Records the exit (or a wait failure) and fires the completion signal
/// exactly once before returning. Dropping `_release` on return stops the
/// listeners behind `abort`.
pub(crate) async fn supervise(
    mut child: Child,
    state: Arc<ProcessState>,
    abort: AbortSignal,
    timeout: Option<Duration>,
    mut kill_rx: mpsc::UnboundedReceiver<i32>,
    _release: DropGuard,
) {
    let mut abort_armed = true;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            reason = abort.aborted(), if abort_armed => {
                abort_armed = false;
                state.mark_aborted(reason, timeout);
                if deliver(&mut child, SIGTERM) {
                    state.mark_killed();
                }
            }
            Some(signal) = kill_rx.recv() => {
                if deliver(&mut child, signal) {
                    state.mark_killed();
                }
            }
        }
    };

    match status {
        Ok(status) => {
            let (code, signal) = exit_parts(status);
            debug!(pid = ?state.pid(), code, signal, "process exited");
            state.record_exit(code, signal);
        }
        Err(err) => {
            warn!(pid = ?state.pid(), %err, "failed to wait for process");
            state.fail(ExecError::Wait(Arc::new(err)));
        }
    }
    state.close();
}

#[cfg(unix)]
fn exit_parts(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    use std::os::unix::process::ExitStatusExt;
    (status.code(), status.signal())
}

#[cfg(not(unix))]
fn exit_parts(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    (status.code(), None)
}

/// Send `signal` to the child. Returns whether it was delivered.
#[cfg(unix)]
#[allow(clippy::needless_pass_by_ref_mut)]
fn deliver(child: &mut Child, signal: i32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    let signal = match Signal::try_from(signal) {
        Ok(signal) => signal,
        Err(err) => {
            warn!(signal, %err, "unsupported signal");
            return false;
        }
    };
    match kill(Pid::from_raw(pid), signal) {
        Ok(()) => {
            trace!(pid, %signal, "signal delivered");
            true
        }
        Err(err) => {
            warn!(pid, %signal, %err, "failed to deliver signal");
            false
        }
    }
}

/// Terminate the child. Signal numbers have no meaning here.
#[cfg(not(unix))]
fn deliver(child: &mut Child, signal: i32) -> bool {
    match child.start_kill() {
        Ok(()) => {
            trace!(signal, "process terminated");
            true
        }
        Err(err) => {
            warn!(%err, "failed to terminate process");
            false
        }
    }
}

/// Whether `signal` can be delivered on this platform.
#[cfg(unix)]
pub(crate) fn is_supported(signal: i32) -> bool {
    nix::sys::signal::Signal::try_from(signal).is_ok()
}

/// Any request terminates the child here, whatever the number.
#[cfg(not(unix))]
pub(crate) const fn is_supported(_signal: i32) -> bool {
    true
}
