//! Command preparation: PATH lookup, shebang handling, and the escaping
//! needed when a native shell sits between us and the target.

pub mod dispatch;
pub mod escape;
pub mod resolve;
pub mod shebang;

pub use dispatch::{shell_command, CommandDispatch, ResolvedCommand};
pub use escape::{escape_argument, escape_command};
pub use resolve::resolve_command;
pub use shebang::{parse_shebang, read_shebang, Shebang};
