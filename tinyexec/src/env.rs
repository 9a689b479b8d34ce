//! Child environment computation.
//!
//! The child inherits the parent environment overlaid with caller overrides,
//! and its PATH-like variable is extended with a package-local binaries
//! directory (`node_modules/.bin`) for the working directory and every
//! ancestor up to the filesystem root.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::trace;

/// Environment map handed to a child process.
pub type EnvMap = BTreeMap<String, String>;

/// Separator between entries of a PATH-like variable.
pub const PATH_DELIMITER: &str = if cfg!(windows) { ";" } else { ":" };

/// Package-local binaries directory, relative to each searched directory.
pub const BIN_DIR: [&str; 2] = ["node_modules", ".bin"];

const DEFAULT_PATH_KEY: &str = "PATH";

/// The PATH-like variable found in an environment.
///
/// `key` keeps whatever casing was found so the recomputed value can be
/// written back without creating a second PATH-like variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvPathInfo {
    pub key: String,
    pub value: String,
}

impl EnvPathInfo {
    fn canonical() -> Self {
        Self {
            key: DEFAULT_PATH_KEY.to_string(),
            value: String::new(),
        }
    }
}

/// Find the PATH-like variable (case-insensitive).
///
/// Only the first matching key is considered. If its value is empty the
/// canonical `PATH` key with an empty value is returned instead.
pub fn get_path_from_env(env: &EnvMap) -> EnvPathInfo {
    env.iter()
        .find(|(key, _)| is_path_key(key))
        .filter(|(_, value)| !value.is_empty())
        .map_or_else(EnvPathInfo::canonical, |(key, value)| EnvPathInfo {
            key: key.clone(),
            value: value.clone(),
        })
}

/// Append `<dir>/node_modules/.bin` for `cwd` and each of its ancestors.
///
/// Entries are appended from `cwd` towards the root. A directory already in
/// the PATH is not added twice. Existing segments are kept as they are,
/// empty ones included, since an empty segment names the current directory.
pub fn add_bin_dirs_to_path(cwd: &Path, path: &EnvPathInfo) -> EnvPathInfo {
    let mut parts: Vec<String> = if path.value.is_empty() {
        Vec::new()
    } else {
        path.value.split(PATH_DELIMITER).map(str::to_owned).collect()
    };

    for dir in cwd.ancestors().filter(|dir| !dir.as_os_str().is_empty()) {
        let bin = bin_dir(dir).to_string_lossy().into_owned();
        if !parts.contains(&bin) {
            parts.push(bin);
        }
    }

    EnvPathInfo {
        key: path.key.clone(),
        value: parts.join(PATH_DELIMITER),
    }
}

/// Compute the child environment from the current process environment.
pub fn compute_env(cwd: &Path, overrides: Option<&EnvMap>) -> EnvMap {
    compute_env_from(process_env(), cwd, overrides)
}

/// Compute the child environment from an explicit base environment.
pub fn compute_env_from(base: EnvMap, cwd: &Path, overrides: Option<&EnvMap>) -> EnvMap {
    let mut env = base;
    if let Some(overrides) = overrides {
        env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let found = get_path_from_env(&env);
    // An empty PATH-like entry under another casing would shadow the
    // canonical key once both reach the child.
    env.retain(|key, value| !(is_path_key(key) && value.is_empty() && *key != found.key));

    let cwd = absolute(cwd);
    let info = add_bin_dirs_to_path(&cwd, &found);
    trace!(key = %info.key, cwd = %cwd.display(), "computed child PATH");
    env.insert(info.key, info.value);
    env
}

/// The current process environment, skipping entries that are not unicode.
pub fn process_env() -> EnvMap {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

fn is_path_key(key: &str) -> bool {
    key.eq_ignore_ascii_case(DEFAULT_PATH_KEY)
}

fn bin_dir(dir: &Path) -> PathBuf {
    BIN_DIR.iter().fold(dir.to_path_buf(), |acc, segment| acc.join(segment))
}

pub(crate) fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
}
