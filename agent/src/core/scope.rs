//! Path-scope check for model-produced diffs.
//!
//! The prompt tells the model to stay inside the application source tree; this
//! module verifies what the diff actually touches. It only reports: the patch
//! is still applied and the report carries the warnings.

use std::collections::BTreeSet;
use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::ScopeReport;

static HUNK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -\d+(?:,(\d+))? \+\d+(?:,(\d+))? @@").expect("hunk header regex")
});

/// Collect every path named by the diff headers and flag those not covered by
/// `allowed`.
///
/// An `allowed` entry ending in `/` is a directory prefix (`src/`); any other
/// entry must match exactly (`README.md`). Absolute paths and paths with `..`
/// are always out of scope.
pub fn check_scope(diff: &str, allowed: &[String]) -> ScopeReport {
    let touched = touched_paths(diff);
    let out_of_scope = touched
        .iter()
        .filter(|path| !is_allowed(path, allowed))
        .cloned()
        .collect();
    ScopeReport {
        touched,
        out_of_scope,
    }
}

/// Sorted, de-duplicated paths from `diff --git`, `---`/`+++` and
/// rename/copy headers. `/dev/null` is ignored.
///
/// Lines inside a hunk are never read as headers, so a removed `-- comment`
/// line cannot pose as `--- path`.
pub fn touched_paths(diff: &str) -> Vec<String> {
    let mut paths = BTreeSet::new();
    let mut hunk = HunkLines::default();
    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            hunk = HunkLines::default();
            let mut parts = rest.split_whitespace();
            if let Some(old) = parts.next() {
                insert_path(&mut paths, old);
            }
            if let Some(new) = parts.next() {
                insert_path(&mut paths, new);
            }
            continue;
        }
        if hunk.is_open() {
            hunk.consume(line);
            continue;
        }
        if let Some(next) = HunkLines::parse(line) {
            hunk = next;
            continue;
        }
        let header = line
            .strip_prefix("--- ")
            .or_else(|| line.strip_prefix("+++ "))
            .or_else(|| line.strip_prefix("rename from "))
            .or_else(|| line.strip_prefix("rename to "))
            .or_else(|| line.strip_prefix("copy from "))
            .or_else(|| line.strip_prefix("copy to "));
        if let Some(rest) = header {
            // Timestamps follow a tab in traditional diff headers.
            let path = rest.split('\t').next().unwrap_or(rest);
            insert_path(&mut paths, path);
        }
    }
    paths.into_iter().collect()
}

/// Lines still expected in the current hunk, per side.
#[derive(Debug, Default)]
struct HunkLines {
    old: usize,
    new: usize,
}

impl HunkLines {
    /// Counts from `@@ -l[,s] +l[,s] @@`; an omitted size means 1.
    fn parse(line: &str) -> Option<Self> {
        let caps = HUNK_HEADER_RE.captures(line)?;
        let size = |idx: usize| -> Option<usize> {
            caps.get(idx)
                .map_or(Some(1), |m| m.as_str().parse().ok())
        };
        Some(Self {
            old: size(1)?,
            new: size(2)?,
        })
    }

    fn is_open(&self) -> bool {
        self.old > 0 || self.new > 0
    }

    fn consume(&mut self, line: &str) {
        match line.as_bytes().first() {
            Some(b'-') => self.old = self.old.saturating_sub(1),
            Some(b'+') => self.new = self.new.saturating_sub(1),
            Some(b'\\') => {}
            // Context line; models often drop the leading space of blank ones.
            _ => {
                self.old = self.old.saturating_sub(1);
                self.new = self.new.saturating_sub(1);
            }
        }
    }
}

fn insert_path(paths: &mut BTreeSet<String>, raw: &str) {
    let raw = raw.trim();
    if raw.is_empty() || raw == "/dev/null" {
        return;
    }
    let path = raw
        .strip_prefix("a/")
        .or_else(|| raw.strip_prefix("b/"))
        .unwrap_or(raw);
    paths.insert(path.to_string());
}

fn is_allowed(path: &str, allowed: &[String]) -> bool {
    let candidate = Path::new(path);
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return false;
    }
    allowed.iter().any(|entry| {
        if entry.ends_with('/') {
            let dir = Path::new(entry.trim_end_matches('/'));
            candidate.starts_with(dir) && candidate != dir
        } else {
            candidate == Path::new(entry)
        }
    })
}
