//! CLI command execution.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, info};

use tinyexec::command::{resolve_command, CommandDispatch, ResolvedCommand};
use tinyexec::env::{compute_env, get_path_from_env, PATH_DELIMITER};
use tinyexec::{execute as exec, ExecError, Output, Process, ProcessInfo};

use super::args::{Cli, Commands, RunArgs};

/// Execute the parsed CLI command. The returned code mirrors the child's.
pub async fn execute(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Which { command, cwd, json } => which(&command, cwd, json),
        Commands::Path { cwd } => path(cwd),
    }
}

/// JSON report printed by `run --json`.
#[derive(Debug, Serialize)]
struct RunReport {
    #[serde(flatten)]
    output: Output,
    process: ProcessInfo,
    upstream: Vec<ProcessInfo>,
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let Some((command, rest)) = args.command.split_first() else {
        bail!("A command is required");
    };
    let options = args.options();

    // Earlier stages are kept for the `--json` report.
    let mut upstream = Vec::with_capacity(args.pipe.len());
    let mut process = exec(command.as_str(), rest.iter().cloned(), options.clone());
    for stage in &args.pipe {
        let words: Vec<&str> = stage.split_whitespace().collect();
        let Some((next_command, next_args)) = words.split_first() else {
            bail!("Empty --pipe command");
        };
        let next = process.pipe(*next_command, next_args.iter().copied(), options.clone());
        upstream.push(std::mem::replace(&mut process, next));
    }
    debug!(command, stages = upstream.len() + 1, "running");

    if args.lines {
        stream_lines(&mut process).await?;
    } else {
        let output = match process.output().await {
            Ok(output) => output,
            Err(ExecError::NonZeroExit(err)) => {
                let output = err.output.clone().unwrap_or_default();
                print_output(&output)?;
                eprintln!("tinyexec: {err}");
                return Ok(exit_status(&process));
            }
            Err(err) => return Err(err).with_context(|| format!("Failed to run `{command}`")),
        };

        if args.json {
            let report = RunReport {
                output,
                process: process.info(),
                upstream: upstream.iter().map(Process::info).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_output(&output)?;
        }
    }

    if process.aborted() {
        info!(pid = ?process.pid(), "process was aborted");
    }
    Ok(exit_status(&process))
}

async fn stream_lines(process: &mut Process) -> Result<()> {
    let mut lines = process.lines();
    let stdout = std::io::stdout();
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => writeln!(stdout.lock(), "{line}").context("Failed to write output")?,
            Err(ExecError::NonZeroExit(err)) => {
                eprintln!("tinyexec: {err}");
                return Ok(());
            }
            Err(err) => return Err(err).context("Failed while streaming output"),
        }
    }
    Ok(())
}

fn print_output(output: &Output) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(output.stdout.as_bytes())
        .context("Failed to write stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    std::io::stderr()
        .lock()
        .write_all(output.stderr.as_bytes())
        .context("Failed to write stderr")?;
    Ok(())
}

/// Exit code for the CLI: the child's code, or 128 + signal.
fn exit_status(process: &Process) -> ExitCode {
    let code = process
        .exit_code()
        .or_else(|| process.signal_code().map(|signal| 128 + signal));
    match code.map(u8::try_from) {
        Some(Ok(code)) => ExitCode::from(code),
        _ => ExitCode::FAILURE,
    }
}

/// Launch plan printed by `which --json`.
#[derive(Debug, Serialize)]
struct WhichReport {
    dispatch: CommandDispatch,
    resolved: Option<PathBuf>,
    invocation: ResolvedCommand,
}

fn which(command: &str, cwd: Option<PathBuf>, json: bool) -> Result<ExitCode> {
    let dir = working_dir(cwd)?;
    let env = compute_env(&dir, None);
    let resolved = resolve_command(command, &env, Some(&dir));

    if json {
        let dispatch = CommandDispatch::detect();
        let report = WhichReport {
            dispatch,
            resolved: resolved.clone(),
            invocation: dispatch.prepare(command, &[], &env, Some(&dir)),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(if resolved.is_some() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    match resolved {
        Some(path) => {
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("tinyexec: {command} not found");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn path(cwd: Option<PathBuf>) -> Result<ExitCode> {
    let dir = working_dir(cwd)?;
    let env = compute_env(&dir, None);
    let info = get_path_from_env(&env);
    for entry in info.value.split(PATH_DELIMITER).filter(|entry| !entry.is_empty()) {
        println!("{entry}");
    }
    Ok(ExitCode::SUCCESS)
}

fn working_dir(cwd: Option<PathBuf>) -> Result<PathBuf> {
    match cwd {
        Some(dir) => {
            if !dir.is_dir() {
                bail!("Not a directory: {}", dir.display());
            }
            Ok(dir)
        }
        None => std::env::current_dir().context("Failed to read the current directory"),
    }
}
