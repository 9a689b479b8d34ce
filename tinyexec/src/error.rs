//! Error types for process execution.
//!
//! Every failure is deferred to the point where output is consumed: the
//! buffered [`Process::output`](crate::Process::output) call or the line
//! stream returned by [`Process::lines`](crate::Process::lines).

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::process::{Output, ProcessInfo};

/// Result alias used throughout the crate.
pub type Result<T, E = ExecError> = std::result::Result<T, E>;

/// Errors raised while launching or consuming a process.
///
/// The enum is `Clone` so one captured terminal error can be handed to every
/// consumer of a handle (and to a piped successor). I/O sources are shared
/// through `Arc` for that reason.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// The OS could not create the process at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: Arc<io::Error>,
    },

    /// The configured timeout expired and the process was terminated.
    #[error("process timed out after {0:?}")]
    Timeout(Duration),

    /// The process exited with a non-zero code and throw-on-error was set.
    #[error(transparent)]
    NonZeroExit(Box<NonZeroExitError>),

    /// A stdout/stderr stream failed mid-read.
    #[error("failed to read process output: {0}")]
    Stream(#[source] Arc<io::Error>),

    /// Waiting on the OS process failed.
    #[error("failed to wait for process: {0}")]
    Wait(#[source] Arc<io::Error>),

    /// A file used for stdin or as an output target could not be accessed.
    #[error("failed to access {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// The upstream process of a pipe failed.
    #[error("upstream process failed: {0}")]
    Upstream(#[source] Box<ExecError>),

    /// Output was requested from a handle that was never spawned.
    #[error("no process was started")]
    NotSpawned,

    /// `spawn` was called on a handle that already launched.
    #[error("process was already spawned")]
    AlreadySpawned,
}

impl ExecError {
    pub(crate) fn spawn(command: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn stream(source: io::Error) -> Self {
        Self::Stream(Arc::new(source))
    }

    pub(crate) fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Returns `true` if this error (or the upstream error it wraps) is a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Upstream(inner) => inner.is_timeout(),
            _ => false,
        }
    }

    /// The non-zero exit details, if this is a non-zero exit error.
    pub fn non_zero_exit(&self) -> Option<&NonZeroExitError> {
        match self {
            Self::NonZeroExit(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NonZeroExitError> for ExecError {
    fn from(err: NonZeroExitError) -> Self {
        Self::NonZeroExit(Box::new(err))
    }
}

/// Raised when a process exits with a defined non-zero code under
/// throw-on-error.
#[derive(Debug, Clone, Error)]
#[error("Process exited with non-zero status ({exit_code})")]
pub struct NonZeroExitError {
    /// The observed exit code.
    pub exit_code: i32,
    /// Snapshot of the handle at the time the error was raised.
    pub process: ProcessInfo,
    /// Captured output, when the buffered mode produced one.
    pub output: Option<Output>,
}

impl NonZeroExitError {
    pub(crate) const fn new(exit_code: i32, process: ProcessInfo, output: Option<Output>) -> Self {
        Self {
            exit_code,
            process,
            output,
        }
    }
}
