//! Interpreter directive (`#!`) detection.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

/// Number of leading bytes inspected for a shebang.
const SHEBANG_PREFIX_LEN: u64 = 150;

static SHEBANG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#! ?(.*)").expect("SHEBANG_REGEX must compile"));

/// The interpreter named by a script's first line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shebang {
    /// Bare interpreter name, e.g. `node` or `sh`.
    pub interpreter: String,
    /// A single interpreter argument, e.g. `-e` in `#!/bin/sh -e`.
    pub argument: Option<String>,
}

/// Parse a shebang from the start of a file's contents.
///
/// `#!/usr/bin/env node` yields `node`; `#!/bin/sh -e` yields `sh` with
/// argument `-e`. Only the first two space-separated words are considered.
pub fn parse_shebang(head: &str) -> Option<Shebang> {
    let line = SHEBANG_REGEX.captures(head)?.get(1)?.as_str().trim_end_matches('\r');
    let mut words = line.split(' ');
    let path = words.next()?;
    let argument = words.next().filter(|word| !word.is_empty());
    let binary = path.rsplit('/').next()?;

    if binary == "env" {
        return argument.map(|interpreter| Shebang {
            interpreter: interpreter.to_string(),
            argument: None,
        });
    }
    if binary.is_empty() {
        return None;
    }

    Some(Shebang {
        interpreter: binary.to_string(),
        argument: argument.map(str::to_string),
    })
}

/// Read the first bytes of `path` and parse a shebang from them.
///
/// Unreadable files simply have no shebang.
pub fn read_shebang(path: &Path) -> Option<Shebang> {
    let mut head = Vec::new();
    let read = File::open(path).and_then(|file| file.take(SHEBANG_PREFIX_LEN).read_to_end(&mut head));
    if let Err(err) = read {
        warn!(path = %path.display(), %err, "could not read shebang");
        return None;
    }
    parse_shebang(&String::from_utf8_lossy(&head))
}
