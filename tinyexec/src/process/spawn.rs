//! The process handle: launch, consumption, piping, and kill.
//!
//! A [`Process`] wraps at most one OS child. Launching hands the child to a
//! supervisor task; the handle keeps the stdout/stderr readers until one of
//! the consumption modes takes them:
//! - buffered, via [`Process::output`] or `.await` on the handle
//! - streaming, via [`Process::lines`]
//! - to a file, via [`Process::to_file`]

use std::future::IntoFuture;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::lines::Lines;
use super::options::{Options, ToFileOptions};
use super::output::Output;
use super::state::{Completion, ProcessInfo, ProcessState, ProcessStatus, UpstreamLink, SIGTERM};
use super::supervisor::supervise;
use crate::command::{shell_command, CommandDispatch, ResolvedCommand};
use crate::env::{compute_env_from, process_env, EnvMap};
use crate::error::{ExecError, Result};
use crate::signal::{AbortReason, AbortSignal};
use crate::stream::{combine_streams, read_to_string, ByteSource};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;
#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Create a handle for `command` and launch it.
///
/// Launch failures do not surface here; they are raised by whichever
/// consumption mode the caller picks.
///
/// # Example
///
/// ```rust,no_run
/// use tinyexec::{execute, Options};
///
/// #[tokio::main]
/// async fn main() -> Result<(), tinyexec::ExecError> {
///     let output = execute("ls", ["-la"], Options::new()).await?;
///     println!("Exit code: {:?}", output.exit_code);
///     println!("Output:\n{}", output.stdout);
///     Ok(())
/// }
/// ```
pub fn execute<I, S>(command: impl Into<String>, args: I, options: Options) -> Process
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut process = Process::new(command, args, options);
    if let Err(err) = process.spawn() {
        debug!(%err, "launch failed, deferring error to the consumer");
    }
    process
}

/// Handle to one external process.
#[derive(Debug)]
pub struct Process {
    command: String,
    args: Vec<String>,
    options: Options,
    state: Arc<ProcessState>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    upstream: Option<UpstreamLink>,
    upstream_stdout: Option<ChildStdout>,
}

impl Process {
    /// Create an unspawned handle.
    pub fn new<I, S>(command: impl Into<String>, args: I, options: Options) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = command.into();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        Self {
            state: Arc::new(ProcessState::new(command.clone(), args.clone())),
            command,
            args,
            options,
            stdout: None,
            stderr: None,
            upstream: None,
            upstream_stdout: None,
        }
    }

    /// Launch the process.
    ///
    /// Returns [`ExecError::AlreadySpawned`] on a second call. Any launch
    /// failure is returned and also kept as the handle's terminal error, so
    /// consumers observe it as well. Must be called within a tokio runtime.
    pub fn spawn(&mut self) -> Result<()> {
        self.state.begin_spawn()?;
        self.launch()
    }

    fn launch(&mut self) -> Result<()> {
        // Stops the abort listeners on every early return, or once the
        // supervisor finishes.
        let release = CancellationToken::new();
        let abort = self.abort_signal(&release);
        let release = release.drop_guard();
        if abort.is_aborted() {
            let reason = abort.reason().unwrap_or(AbortReason::Aborted);
            debug!(command = %self.command, ?reason, "signal fired before launch");
            self.state.mark_aborted(reason, self.options.timeout);
            self.state.close();
            return Ok(());
        }

        let env = self.child_env();
        let resolved = self.resolve(&env);
        debug!(
            command = %self.command,
            program = %resolved.program,
            args = ?resolved.args,
            "launching process"
        );

        let mut cmd = self.command_for(&resolved, env);
        if let Err(err) = self.configure_stdin(&mut cmd) {
            self.state.fail(err.clone());
            self.state.close();
            return Err(err);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                let err = ExecError::spawn(&self.command, err);
                debug!(%err, "spawn failed");
                self.state.fail(err.clone());
                self.state.close();
                return Err(err);
            }
        };

        self.stdout = child.stdout.take();
        self.stderr = child.stderr.take();

        if let (Some(mut stdin), Some(mut upstream)) =
            (child.stdin.take(), self.upstream_stdout.take())
        {
            tokio::spawn(async move {
                match tokio::io::copy(&mut upstream, &mut stdin).await {
                    Ok(bytes) => trace!(bytes, "pipe drained"),
                    Err(err) => trace!(%err, "pipe closed early"),
                }
            });
        }

        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        self.state.mark_running(child.id(), kill_tx);
        debug!(pid = ?child.id(), "process started");

        tokio::spawn(supervise(
            child,
            Arc::clone(&self.state),
            abort,
            self.options.timeout,
            kill_rx,
            release,
        ));
        Ok(())
    }

    /// Fold the timeout and the caller's signal into one.
    fn abort_signal(&self, release: &CancellationToken) -> AbortSignal {
        let mut signals = Vec::with_capacity(2);
        if let Some(duration) = self.options.timeout {
            signals.push(AbortSignal::timeout_until(duration, release.clone()));
        }
        if let Some(signal) = &self.options.signal {
            signals.push(signal.clone());
        }
        AbortSignal::any_until(&signals, release.clone())
    }

    fn child_env(&self) -> EnvMap {
        let launch = &self.options.launch;
        let base = if launch.env_clear {
            EnvMap::new()
        } else {
            process_env()
        };
        let anchor = launch
            .cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();

        let mut env = compute_env_from(base, &anchor, Some(&launch.env));
        for key in &launch.env_remove {
            env.remove(key);
        }
        env
    }

    fn resolve(&self, env: &EnvMap) -> ResolvedCommand {
        let launch = &self.options.launch;
        if launch.shell {
            shell_command(&self.command, &self.args, env)
        } else {
            CommandDispatch::detect().prepare(&self.command, &self.args, env, launch.cwd.as_deref())
        }
    }

    fn command_for(&self, resolved: &ResolvedCommand, env: EnvMap) -> Command {
        let launch = &self.options.launch;
        let mut cmd = std::process::Command::new(&resolved.program);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            if resolved.verbatim_args {
                for arg in &resolved.args {
                    cmd.raw_arg(arg);
                }
            } else {
                cmd.args(&resolved.args);
            }

            let mut flags = 0;
            if launch.windows_hide {
                flags |= CREATE_NO_WINDOW;
            }
            if self.options.persist {
                flags |= DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP;
            }
            cmd.creation_flags(flags);
        }
        #[cfg(not(windows))]
        cmd.args(&resolved.args);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if self.options.persist {
                cmd.process_group(0);
            }
        }

        cmd.env_clear().envs(env);
        if let Some(dir) = &launch.cwd {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut cmd = Command::from(cmd);
        cmd.kill_on_drop(!self.options.persist);
        cmd
    }

    fn configure_stdin(&self, cmd: &mut Command) -> Result<()> {
        if self.upstream_stdout.is_some() {
            cmd.stdin(Stdio::piped());
        } else if let Some(path) = &self.options.launch.input_file {
            let file = std::fs::File::open(path).map_err(|err| ExecError::file(path, err))?;
            cmd.stdin(Stdio::from(file));
        } else {
            cmd.stdin(Stdio::null());
        }
        Ok(())
    }

    fn completion(&self) -> Completion {
        Completion::new(
            Arc::clone(&self.state),
            self.upstream.clone(),
            self.options.throw_on_error,
        )
    }

    /// Drain stdout and stderr, wait for the process, and return the output.
    ///
    /// A terminal error captured during the run (spawn failure, timeout,
    /// upstream failure) is returned instead. Under throw-on-error a
    /// non-zero exit code becomes [`ExecError::NonZeroExit`] carrying the
    /// output.
    pub async fn output(&mut self) -> Result<Output> {
        if !self.state.is_spawned() {
            return Err(ExecError::NotSpawned);
        }

        let drained = tokio::try_join!(drain(self.stdout.take()), drain(self.stderr.take()));
        let (stdout, stderr) = match drained {
            Ok(text) => text,
            Err(err) => {
                let err = ExecError::stream(err);
                self.state.fail(err.clone());
                return Err(err);
            }
        };

        let completion = self.completion();
        let exit_code = completion.settle().await?;
        let output = Output {
            stdout,
            stderr,
            exit_code,
        };
        completion.check_exit(exit_code, Some(&output))?;
        Ok(output)
    }

    /// Stream combined stdout and stderr line by line.
    ///
    /// The stream ends once both pipes close and the process has settled;
    /// a terminal error or a throw-on-error exit is yielded as the final item.
    pub fn lines(&mut self) -> Lines {
        if !self.state.is_spawned() {
            return Lines::failed(ExecError::NotSpawned);
        }

        let mut sources: Vec<ByteSource> = Vec::with_capacity(2);
        if let Some(stderr) = self.stderr.take() {
            sources.push(Box::new(stderr));
        }
        if let Some(stdout) = self.stdout.take() {
            sources.push(Box::new(stdout));
        }
        Lines::new(
            combine_streams(sources, self.options.launch.buffer_size),
            self.completion(),
        )
    }

    /// Write the selected streams to `path`, then wait for the process.
    ///
    /// Unselected streams are discarded. Returns the exit code.
    pub async fn to_file(
        &mut self,
        path: impl AsRef<Path>,
        options: ToFileOptions,
    ) -> Result<Option<i32>> {
        if !self.state.is_spawned() {
            return Err(ExecError::NotSpawned);
        }

        let path = path.as_ref();
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|err| ExecError::file(path, err))?;

        let mut sources: Vec<ByteSource> = Vec::with_capacity(2);
        match self.stdout.take() {
            Some(stdout) if options.stdout => sources.push(Box::new(stdout)),
            Some(stdout) => discard(stdout),
            None => {}
        }
        match self.stderr.take() {
            Some(stderr) if options.stderr => sources.push(Box::new(stderr)),
            Some(stderr) => discard(stderr),
            None => {}
        }

        let mut chunks = combine_streams(sources, self.options.launch.buffer_size);
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(ExecError::stream)?;
            file.write_all(&chunk)
                .await
                .map_err(|err| ExecError::file(path, err))?;
        }
        file.flush().await.map_err(|err| ExecError::file(path, err))?;

        let completion = self.completion();
        let exit_code = completion.settle().await?;
        completion.check_exit(exit_code, None)?;
        Ok(exit_code)
    }

    /// Pipe this process's stdout into a new process and launch it.
    ///
    /// The new handle waits for this one on completion, and fails with
    /// [`ExecError::Upstream`] if this one failed. This handle's stderr is
    /// drained and discarded so a chatty producer cannot stall on a full
    /// pipe while the consumer waits for it.
    pub fn pipe<I, S>(&mut self, command: impl Into<String>, args: I, options: Options) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = Self::new(command, args, options);
        next.upstream_stdout = self.stdout.take();
        if let Some(stderr) = self.stderr.take() {
            discard(stderr);
        }
        next.upstream = Some(UpstreamLink {
            state: Arc::clone(&self.state),
            throw_on_error: self.options.throw_on_error,
        });
        if let Err(err) = next.spawn() {
            debug!(%err, "piped launch failed, deferring error to the consumer");
        }
        next
    }

    /// Request termination with `signal` (SIGTERM when `None`).
    ///
    /// Returns `false` before spawn, after close, or if the request could
    /// not be queued.
    pub fn kill(&self, signal: Option<i32>) -> bool {
        self.state.kill(signal.unwrap_or(SIGTERM))
    }

    /// Wait for the process to close without consuming its output.
    pub async fn wait(&self) {
        self.state.wait_closed().await;
    }

    /// The command as given, before resolution.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments as given.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// OS process id; `None` before a successful launch.
    pub fn pid(&self) -> Option<u32> {
        self.state.pid()
    }

    /// Whether an abort signal or the timeout fired for this process.
    pub fn aborted(&self) -> bool {
        self.state.aborted()
    }

    /// Whether the abort came from the timeout.
    pub fn timed_out(&self) -> bool {
        self.state.timed_out()
    }

    /// Whether a termination signal was delivered to the child.
    pub fn killed(&self) -> bool {
        self.state.killed()
    }

    /// Exit code; `None` until exit, and for signal terminations.
    pub fn exit_code(&self) -> Option<i32> {
        self.state.exit_code()
    }

    /// Terminating signal, if the process was ended by one (unix only).
    pub fn signal_code(&self) -> Option<i32> {
        self.state.signal_code()
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ProcessStatus {
        self.state.status()
    }

    /// Snapshot of the handle's state.
    pub fn info(&self) -> ProcessInfo {
        self.state.info()
    }
}

impl IntoFuture for Process {
    type Output = Result<Output>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(mut self) -> Self::IntoFuture {
        Box::pin(async move { self.output().await })
    }
}

async fn drain<R>(reader: Option<R>) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(reader) => read_to_string(reader).await,
        None => Ok(String::new()),
    }
}

fn discard<R>(mut reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
    });
}
