//! Output artifacts of a run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::types::Report;
use crate::io::config::ArtifactSettings;
use crate::io::report::render_report;

/// Resolved artifact locations for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub plan: PathBuf,
    pub failed_patch: PathBuf,
    pub report: PathBuf,
    pub report_json: PathBuf,
}

impl ArtifactPaths {
    /// Resolve configured paths against `root`; absolute paths are kept.
    pub fn new(root: &Path, settings: &ArtifactSettings) -> Self {
        Self {
            plan: root.join(&settings.plan),
            failed_patch: root.join(&settings.failed_patch),
            report: root.join(&settings.report),
            report_json: root.join(&settings.report_json),
        }
    }

    /// Plan text plus a trailing newline.
    pub fn write_plan(&self, plan: &str) -> Result<()> {
        write_text(&self.plan, &format!("{plan}\n"))
    }

    /// Diff text as returned by the model, for manual inspection.
    pub fn write_failed_patch(&self, diff: &str) -> Result<()> {
        write_text(&self.failed_patch, diff)
    }

    /// Markdown report for the PR creator, then its JSON form.
    pub fn write_report(&self, report: &Report) -> Result<()> {
        write_text(&self.report, &render_report(report)?)?;
        write_json(&self.report_json, report)
    }
}

pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
    debug!(path = %path.display(), bytes = contents.len(), "wrote artifact");
    Ok(())
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    write_text(path, &payload)
}
