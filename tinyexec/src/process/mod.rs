//! Process handles and their consumption modes.
//!
//! [`execute`] launches a command and returns a [`Process`], which can be
//! awaited for a buffered [`Output`], iterated line by line through
//! [`Lines`], or piped into another process.

mod lines;
mod options;
mod output;
mod spawn;
mod state;
mod supervisor;

pub use lines::Lines;
pub use options::{LaunchOptions, Options, ToFileOptions, DEFAULT_BUFFER_SIZE};
pub use output::Output;
pub use spawn::{execute, Process};
pub use state::{ProcessInfo, ProcessStatus, SIGTERM};
