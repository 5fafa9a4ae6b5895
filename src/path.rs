/*
 * Copyright (c) 2025 Raphael Amorim
 *
 * This file is part of nesh, which is licensed
 * under GNU General Public License v3.0.
 */

//! Filesystem path completion.
//!
//! A line such as `src/ma` is split at its last separator into the
//! directory text `src/` and the prefix `ma`. The directory is listed and
//! the entries starting with the prefix are the hits. When exactly one hit
//! is a directory it gets a trailing `/`, so completing repeatedly walks
//! down one level at a time. Errors reading the directory are never
//! reported: they simply produce no hits.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::trace;

pub const SEPARATOR: char = '/';

/// Lists and filters directory entries relative to a base directory
#[derive(Debug, Clone)]
pub struct PathCompleter {
    base: PathBuf,
}

/// Result of matching one line against the filesystem
struct Matches {
    dir_text: String,
    prefix: String,
    hits: Vec<String>,
}

impl PathCompleter {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Completer relative to the process's working directory
    pub fn current() -> Self {
        Self::new(".")
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Full candidates for `line`: the directory text joined with every hit
    pub fn complete(&self, line: &str) -> Vec<String> {
        let matches = self.matches(line, false);
        matches
            .hits
            .into_iter()
            .map(|hit| format!("{}{}", matches.dir_text, hit))
            .collect()
    }

    /// Entry names matching `line` along with the prefix they were matched on
    pub fn items(&self, line: Option<&str>) -> Option<(Vec<String>, String)> {
        let matches = self.matches(line?, false);
        Some((matches.hits, matches.prefix))
    }

    /// Like [`PathCompleter::items`] restricted to directories
    pub fn dirs(&self, line: &str) -> (Vec<String>, String) {
        let matches = self.matches(line, true);
        (matches.hits, matches.prefix)
    }

    fn matches(&self, line: &str, dirs_only: bool) -> Matches {
        let (dir_text, prefix) = split(line);
        let dir = self.resolve(dir_text);

        let mut hits: Vec<String> = list_dir(&dir)
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .filter(|name| !dirs_only || is_dir(&dir.join(name)))
            .collect();

        if let [hit] = hits.as_mut_slice() {
            if is_dir(&dir.join(&*hit)) {
                hit.push(SEPARATOR);
            }
        }

        trace!(line, hits = hits.len(), "path completion");
        Matches {
            dir_text: dir_text.to_string(),
            prefix: prefix.to_string(),
            hits,
        }
    }

    fn resolve(&self, dir_text: &str) -> PathBuf {
        if dir_text.is_empty() {
            self.base.clone()
        } else {
            // An absolute directory text replaces the base
            self.base.join(dir_text)
        }
    }
}

/// Splits a line into the directory text (up to and including the last
/// separator) and the trailing prefix.
pub fn split(line: &str) -> (&str, &str) {
    match line.rfind(SEPARATOR) {
        Some(index) => line.split_at(index + 1),
        None => ("", line),
    }
}

/// The trailing component of `line`; empty when it ends with a separator
pub fn basename(line: &str) -> &str {
    split(line).1
}

/// Entry names of `dir` in name order. Unreadable directories and names
/// that are not valid UTF-8 are skipped.
fn list_dir(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            trace!(dir = %dir.display(), %err, "directory not listable");
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

fn is_dir(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.is_dir()).unwrap_or(false)
}

/// Completes `line` relative to the working directory
pub fn complete(line: &str) -> Vec<String> {
    PathCompleter::current().complete(line)
}

/// Completes `line` relative to `base`
pub fn complete_in(base: &Path, line: &str) -> Vec<String> {
    PathCompleter::new(base).complete(line)
}

/// Item completion for commands taking any path, such as `cat` or `ls`
pub fn item_path_completer(line: Option<&str>) -> Option<(Vec<String>, String)> {
    PathCompleter::current().items(line)
}

/// Directory completion for `cd`
pub fn dir_path_completer(line: &str) -> (Vec<String>, String) {
    PathCompleter::current().dirs(line)
}

/// Normalizes a path typed inside a string literal.
///
/// Repeated separators collapse and a leading `~` expands to the home
/// directory. `.` and `..` segments are left alone so that `file.md/..`
/// still fails to list instead of silently resolving to the parent.
pub fn normalize_current(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let expanded = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(SEPARATOR) => {
            match dirs::home_dir().and_then(|home| home.to_str().map(str::to_string)) {
                Some(home) => format!("{home}{rest}"),
                None => raw.to_string(),
            }
        }
        _ => raw.to_string(),
    };

    let mut normalized = String::with_capacity(expanded.len());
    for ch in expanded.chars() {
        if ch == SEPARATOR && normalized.ends_with(SEPARATOR) {
            continue;
        }
        normalized.push(ch);
    }
    normalized
}
