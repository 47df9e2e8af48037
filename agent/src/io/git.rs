//! Git adapter for patch application and change summaries.
//!
//! All calls go through a [`CommandRunner`], so the pipeline can be tested
//! with a scripted runner instead of a real repository.

use anyhow::{Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::types::PatchOutcome;
use crate::io::process::{CommandResult, CommandRunner, CommandSpec};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

impl StatusEntry {
    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }
}

/// Wrapper for executing git commands through a runner.
pub struct Git<'a, R: CommandRunner> {
    runner: &'a R,
}

impl<'a, R: CommandRunner> Git<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }

    /// Apply a unified diff from stdin, fixing whitespace errors.
    ///
    /// `directory` is forwarded as `--directory` for diffs written relative
    /// to a subtree. A non-zero exit is reported in the outcome, not as `Err`;
    /// `Err` means git could not be run at all.
    #[instrument(skip_all, fields(diff_bytes = diff.len()))]
    pub fn apply_patch(&self, diff: &str, directory: Option<&str>) -> Result<PatchOutcome> {
        let mut spec = CommandSpec::new("git").args(["apply", "--whitespace=fix"]);
        if let Some(dir) = directory.filter(|d| !d.trim().is_empty()) {
            spec = spec.arg(format!("--directory={dir}"));
        }
        let mut input = diff.to_string();
        input.push('\n');
        let spec = spec.arg("-").stdin(input);

        let result = self.runner.run(&spec)?;
        let success = result.success();
        if success {
            debug!("patch applied");
        } else {
            warn!(exit_code = ?result.exit_code, "git apply failed");
        }
        Ok(PatchOutcome {
            success,
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }

    /// `git diff --name-only`, trimmed.
    pub fn changed_files(&self) -> Result<String> {
        Ok(self.run_capture(&["diff", "--name-only"])?.trim().to_string())
    }

    /// `git diff --stat`, trimmed.
    pub fn diff_stat(&self) -> Result<String> {
        Ok(self.run_capture(&["diff", "--stat"])?.trim().to_string())
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(output.stdout)
    }

    fn run_checked(&self, args: &[&str]) -> Result<CommandResult> {
        let output = self.runner.run(&CommandSpec::new("git").args(args.iter().copied()))?;
        if !output.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                output.stderr.trim()
            ));
        }
        Ok(output)
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}
