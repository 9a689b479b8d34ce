//! Launch configuration for a process handle.

use std::path::PathBuf;
use std::time::Duration;

use crate::env::EnvMap;
use crate::signal::AbortSignal;

/// Default capacity of the combined output channel.
pub const DEFAULT_BUFFER_SIZE: usize = 64;

/// Options handed to the OS launch.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Working directory for the child. Also anchors PATH augmentation.
    pub cwd: Option<PathBuf>,

    /// Environment variables to set (merged over the inherited env).
    pub env: EnvMap,

    /// Environment variables to remove after merging.
    pub env_remove: Vec<String>,

    /// Start from an empty environment instead of the inherited one.
    pub env_clear: bool,

    /// Run the joined command line through the platform shell.
    pub shell: bool,

    /// Suppress the console window on Windows (default: true).
    pub windows_hide: bool,

    /// File connected to the child's stdin when nothing is piped in.
    pub input_file: Option<PathBuf>,

    /// Capacity of the combined output channel (default: 64).
    pub buffer_size: usize,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            env: EnvMap::new(),
            env_remove: Vec::new(),
            env_clear: false,
            shell: false,
            windows_hide: true,
            input_file: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl LaunchOptions {
    /// Create launch options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set multiple environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Remove an environment variable.
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Clear the inherited environment before setting variables.
    pub fn env_clear(mut self) -> Self {
        self.env_clear = true;
        self
    }

    /// Run through the platform shell instead of resolving the command.
    pub fn shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    /// Toggle console window suppression on Windows.
    pub fn windows_hide(mut self, hide: bool) -> Self {
        self.windows_hide = hide;
        self
    }

    /// Read the child's stdin from a file.
    pub fn input_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_file = Some(path.into());
        self
    }

    /// Set the combined output channel capacity.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }
}

/// Per-execution options.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// External abort signal.
    pub signal: Option<AbortSignal>,

    /// OS launch options.
    pub launch: LaunchOptions,

    /// Abort the process after this long.
    pub timeout: Option<Duration>,

    /// Detach the child so it outlives the parent.
    pub persist: bool,

    /// Treat a non-zero exit code as an error.
    pub throw_on_error: bool,
}

impl Options {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort when `signal` fires.
    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Set the OS launch options.
    pub fn launch(mut self, launch: LaunchOptions) -> Self {
        self.launch = launch;
        self
    }

    /// Abort the process after `duration`.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Detach the child from the parent's lifetime.
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Raise [`NonZeroExitError`](crate::NonZeroExitError) on a non-zero exit code.
    pub fn throw_on_error(mut self, throw: bool) -> Self {
        self.throw_on_error = throw;
        self
    }
}

/// Which streams [`Process::to_file`](crate::Process::to_file) writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToFileOptions {
    pub stdout: bool,
    pub stderr: bool,
}

impl Default for ToFileOptions {
    fn default() -> Self {
        Self {
            stdout: true,
            stderr: true,
        }
    }
}

impl ToFileOptions {
    /// Only stdout.
    pub const fn stdout_only() -> Self {
        Self {
            stdout: true,
            stderr: false,
        }
    }

    /// Only stderr.
    pub const fn stderr_only() -> Self {
        Self {
            stdout: false,
            stderr: true,
        }
    }
}
