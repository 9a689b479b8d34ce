//! Executable lookup against a child's PATH.
//!
//! Lookup is scoped to an explicit directory through [`which::which_in`], so
//! resolving "as if run from" another directory never touches the
//! process-wide working directory.

use std::path::{Path, PathBuf};

use tracing::trace;

use crate::env::{absolute, get_path_from_env, EnvMap};

/// Resolve `command` to an absolute path using the PATH found in `env`.
///
/// The platform lookup (honouring executable extensions) is tried first;
/// if it fails, PATH is searched again for a file with exactly that name,
/// whatever its extension. Relative results are anchored at `cwd` (or the
/// process working directory). Lookup failures yield `None`.
pub fn resolve_command(command: &str, env: &EnvMap, cwd: Option<&Path>) -> Option<PathBuf> {
    let base = match cwd {
        Some(dir) => absolute(dir),
        None => std::env::current_dir().ok()?,
    };
    let search_path = get_path_from_env(env).value;

    let found = which::which_in(command, Some(&search_path), &base)
        .ok()
        .or_else(|| find_exact(command, &search_path, &base));
    trace!(command, resolved = ?found, "resolved command");

    found.map(|path| if path.is_absolute() { path } else { base.join(path) })
}

fn find_exact(command: &str, search_path: &str, base: &Path) -> Option<PathBuf> {
    let candidate = Path::new(command);
    if candidate.components().count() > 1 {
        let path = base.join(candidate);
        return path.is_file().then_some(path);
    }

    std::env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| base.join(dir).join(command))
        .find(|path| path.is_file())
}
