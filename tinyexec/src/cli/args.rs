//! CLI argument definitions.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use tinyexec::{LaunchOptions, Options};

/// tinyexec - run processes with PATH augmentation, timeouts, and pipes
#[derive(Parser, Debug)]
#[command(name = "tinyexec")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command and print its output
    Run(RunArgs),

    /// Show how a command would be resolved and launched
    Which {
        /// Command to resolve
        command: String,

        /// Resolve as if run from this directory
        #[arg(long, env = "TINYEXEC_CWD")]
        cwd: Option<PathBuf>,

        /// Print the full launch plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the augmented PATH entries, one per line
    Path {
        /// Directory whose ancestors contribute bin directories
        #[arg(long, env = "TINYEXEC_CWD")]
        cwd: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Abort the process after this many milliseconds
    #[arg(long, env = "TINYEXEC_TIMEOUT", value_name = "MS")]
    pub timeout: Option<u64>,

    /// Working directory for the process
    #[arg(long, env = "TINYEXEC_CWD")]
    pub cwd: Option<PathBuf>,

    /// Extra environment variable (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// Let the process outlive this one
    #[arg(long)]
    pub persist: bool,

    /// Fail on a non-zero exit code
    #[arg(long)]
    pub throw_on_error: bool,

    /// Stream combined output line by line
    #[arg(long, conflicts_with = "json")]
    pub lines: bool,

    /// Print the output and process details as JSON
    #[arg(long)]
    pub json: bool,

    /// Run the command line through the platform shell
    #[arg(long)]
    pub shell: bool,

    /// Pipe output through another command, e.g. --pipe "grep foo" (repeatable)
    #[arg(long = "pipe", value_name = "COMMAND")]
    pub pipe: Vec<String>,

    /// Command and arguments to run
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    /// Build process options from the flags.
    pub fn options(&self) -> Options {
        let mut launch = LaunchOptions::new()
            .envs(self.env.iter().cloned())
            .shell(self.shell);
        if let Some(cwd) = &self.cwd {
            launch = launch.cwd(cwd);
        }

        let mut options = Options::new()
            .launch(launch)
            .persist(self.persist)
            .throw_on_error(self.throw_on_error);
        if let Some(ms) = self.timeout {
            options = options.timeout(Duration::from_millis(ms));
        }
        options
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{s}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_trailing_command() {
        let cli = Cli::try_parse_from([
            "tinyexec", "run", "--timeout", "50", "-e", "A=1", "--", "ls", "-la",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.command, ["ls", "-la"]);
        assert_eq!(args.env, [("A".to_string(), "1".to_string())]);

        let options = args.options();
        assert_eq!(options.timeout, Some(Duration::from_millis(50)));
        assert_eq!(options.launch.env.get("A").map(String::as_str), Some("1"));
    }

    #[test]
    fn rejects_malformed_env() {
        assert!(parse_key_val("NOEQUALS").is_err());
        assert!(parse_key_val("=value").is_err());
        assert_eq!(
            parse_key_val("K=a=b").unwrap(),
            ("K".to_string(), "a=b".to_string())
        );
    }

    #[test]
    fn lines_conflicts_with_json() {
        let result = Cli::try_parse_from(["tinyexec", "run", "--lines", "--json", "--", "true"]);
        assert!(result.is_err());
    }

    #[test]
    fn run_requires_command() {
        assert!(Cli::try_parse_from(["tinyexec", "run"]).is_err());
    }
}
