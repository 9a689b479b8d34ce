//! Platform strategy for turning a requested command into a launchable one.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::escape::{escape_argument, escape_command};
use super::resolve::resolve_command;
use super::shebang::read_shebang;
use crate::env::EnvMap;

static EXECUTABLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(?:com|exe)$").expect("EXECUTABLE_REGEX must compile"));

static CMD_SHIM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)node_modules[\\/]\.bin[\\/][^\\/]+\.cmd$").expect("CMD_SHIM_REGEX must compile")
});

const DEFAULT_COMSPEC: &str = "cmd.exe";
const POSIX_SHELL: &str = "/bin/sh";

/// How commands are handed to the OS on this platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandDispatch {
    /// The OS launches the command directly (POSIX).
    Direct,
    /// Non-binary targets go through `cmd.exe` with escaped arguments (Windows).
    ShellMediated,
}

/// A command ready for the OS process primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCommand {
    /// Program to launch.
    pub program: String,
    /// Arguments, already escaped when `verbatim_args` is set.
    pub args: Vec<String>,
    /// Absolute path of the resolved executable or script, if one was found.
    pub resolved: Option<PathBuf>,
    /// The escaped command line, when a native shell mediates the call.
    pub shell_line: Option<String>,
    /// Arguments must be passed without further quoting.
    pub verbatim_args: bool,
}

impl ResolvedCommand {
    fn passthrough(command: &str, args: &[String]) -> Self {
        Self {
            program: command.to_string(),
            args: args.to_vec(),
            resolved: None,
            shell_line: None,
            verbatim_args: false,
        }
    }
}

impl CommandDispatch {
    /// The strategy for the host platform.
    pub const fn detect() -> Self {
        if cfg!(windows) {
            Self::ShellMediated
        } else {
            Self::Direct
        }
    }

    /// Prepare `command` and `args` for launch.
    ///
    /// `Direct` passes them through untouched; the OS searches the child's
    /// PATH. `ShellMediated` resolves the command, follows a shebang, and
    /// wraps anything that is not a `.exe`/`.com` binary in an escaped
    /// `cmd.exe /d /s /c` invocation. Resolution failures fall back to the
    /// original command so the launch itself reports the error.
    pub fn prepare(
        self,
        command: &str,
        args: &[String],
        env: &EnvMap,
        cwd: Option<&Path>,
    ) -> ResolvedCommand {
        match self {
            Self::Direct => ResolvedCommand::passthrough(command, args),
            Self::ShellMediated => prepare_shell_mediated(command, args, env, cwd),
        }
    }
}

fn prepare_shell_mediated(
    command: &str,
    args: &[String],
    env: &EnvMap,
    cwd: Option<&Path>,
) -> ResolvedCommand {
    let mut command = command.to_string();
    let mut args = args.to_vec();

    let mut file = resolve_command(&command, env, cwd);
    if let Some(shebang) = file.as_deref().and_then(read_shebang) {
        if let Some(script) = file.as_deref() {
            args.insert(0, script.to_string_lossy().into_owned());
        }
        if let Some(argument) = shebang.argument {
            args.insert(0, argument);
        }
        debug!(interpreter = %shebang.interpreter, "following shebang");
        command = shebang.interpreter;
        file = resolve_command(&command, env, cwd);
    }

    let command_file = file
        .as_deref()
        .map_or_else(|| command.clone(), |path| path.to_string_lossy().into_owned());

    if EXECUTABLE_REGEX.is_match(&command_file) {
        return ResolvedCommand {
            program: command_file,
            args,
            resolved: file,
            shell_line: None,
            verbatim_args: false,
        };
    }

    let double_escape = CMD_SHIM_REGEX.is_match(&command_file);
    let line = std::iter::once(escape_command(&normalize_separators(&command)))
        .chain(args.iter().map(|arg| escape_argument(arg, double_escape)))
        .collect::<Vec<_>>()
        .join(" ");
    debug!(%line, double_escape, "dispatching through cmd.exe");

    ResolvedCommand {
        program: comspec(env),
        args: vec![
            "/d".to_string(),
            "/s".to_string(),
            "/c".to_string(),
            format!("\"{line}\""),
        ],
        resolved: file,
        shell_line: Some(line),
        verbatim_args: true,
    }
}

/// Run a raw command line through the platform shell, with no escaping.
pub fn shell_command(command: &str, args: &[String], env: &EnvMap) -> ResolvedCommand {
    let line = std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    if cfg!(windows) {
        ResolvedCommand {
            program: comspec(env),
            args: vec![
                "/d".to_string(),
                "/s".to_string(),
                "/c".to_string(),
                format!("\"{line}\""),
            ],
            resolved: None,
            shell_line: Some(line),
            verbatim_args: true,
        }
    } else {
        ResolvedCommand {
            program: POSIX_SHELL.to_string(),
            args: vec!["-c".to_string(), line.clone()],
            resolved: None,
            shell_line: Some(line),
            verbatim_args: false,
        }
    }
}

fn comspec(env: &EnvMap) -> String {
    env.iter()
        .find(|(key, value)| key.eq_ignore_ascii_case("comspec") && !value.is_empty())
        .map_or_else(|| DEFAULT_COMSPEC.to_string(), |(_, value)| value.clone())
}

fn normalize_separators(command: &str) -> String {
    if cfg!(windows) {
        command.replace('/', "\\")
    } else {
        command.to_string()
    }
}
