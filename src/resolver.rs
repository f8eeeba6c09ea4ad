//! Logical path normalization and the set of paths already satisfied by a
//! more recent layer.

use std::collections::HashSet;

/// Canonicalizes a path taken from a tar header so that spellings produced by
/// different tools compare equal: `./usr/bin/foo`, `usr//bin/foo/` and
/// `/usr/bin/foo` all become `usr/bin/foo`.
///
/// `..` components that would climb above a relative path's start are kept
/// (`../etc/passwd` stays as is); above an absolute root they are dropped.
/// Paths consisting only of `.` or separators normalize to the empty string.
pub fn normalize_entry_path(raw: &str) -> String {
    let rooted = raw.starts_with('/');
    let mut out: Vec<&str> = Vec::new();

    for comp in raw.split('/') {
        match comp {
            "" | "." => {}
            ".." => match out.last() {
                Some(&last) if last != ".." => {
                    out.pop();
                }
                _ if rooted => {}
                _ => out.push(".."),
            },
            c => out.push(c),
        }
    }

    out.join("/")
}

/// True for normalized paths that point outside the image root.
pub fn escapes_root(normalized: &str) -> bool {
    normalized == ".." || normalized.starts_with("../")
}

/// Targets are declared with a leading separator, tar entries are not.
pub fn normalize_target(from: &str) -> String {
    normalize_entry_path(from.strip_prefix('/').unwrap_or(from))
}

/// Normalized logical paths that have been claimed by a layer.
///
/// Grows monotonically during a walk; once a path is in the set no deeper
/// layer's copy is ever considered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSet {
    paths: HashSet<String>,
}

impl ResolvedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Returns `false` if the path was already resolved.
    pub fn insert(&mut self, path: String) -> bool {
        self.paths.insert(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
