//! Process execution with lazy line streaming, piping, and cross-platform
//! command resolution.
//!
//! ```rust,no_run
//! use futures::TryStreamExt;
//! use tinyexec::{execute, Options};
//!
//! # async fn demo() -> Result<(), tinyexec::ExecError> {
//! // Buffered
//! let output = execute("echo", ["foo"], Options::new()).await?;
//! assert_eq!(output.stdout, "foo\n");
//!
//! // Streaming
//! let mut proc = execute("ls", ["-1"], Options::new());
//! let lines: Vec<String> = proc.lines().try_collect().await?;
//!
//! // Piping
//! let mut producer = execute("printf", ["foo\\nbar\\n"], Options::new());
//! let filtered = producer.pipe("grep", ["foo"], Options::new()).await?;
//! # let _ = (lines, filtered);
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod env;
pub mod error;
pub mod process;
pub mod signal;
pub mod stream;

pub use error::{ExecError, NonZeroExitError, Result};
pub use process::{
    execute, LaunchOptions, Lines, Options, Output, Process, ProcessInfo, ProcessStatus,
    ToFileOptions,
};
pub use signal::{AbortReason, AbortSignal};
