//! Report composition for the PR creator.
//!
//! The change summary is queried from git after the patch landed rather than
//! reconstructed from the diff text, so the report describes the working tree
//! as it is.

use anyhow::{Context, Result};
use minijinja::Environment;
use tracing::{debug, warn};

use crate::core::text::or_placeholder;
use crate::core::types::{
    BuildOutcome, BuildStatus, BuildSummary, IssueContext, Report, RunMetadata, ScopeReport,
};
use crate::io::git::Git;
use crate::io::process::CommandRunner;

const REPORT_TEMPLATE: &str = include_str!("templates/report.md");

pub const NO_PLAN_PLACEHOLDER: &str = "_(no plan text)_";
pub const NO_FILES_PLACEHOLDER: &str = "(none)";
pub const NO_DIFFSTAT_PLACEHOLDER: &str = "(no diffstat)";
pub const NO_OUTPUT_PLACEHOLDER: &str = "(no output captured)";

/// Everything the report needs besides the git queries.
#[derive(Debug, Clone)]
pub struct ReportInputs<'a> {
    pub issue: &'a IssueContext,
    pub plan: &'a str,
    pub scope: &'a ScopeReport,
    pub build: &'a BuildOutcome,
    /// Display form of the build command.
    pub build_command: String,
    pub model: &'a str,
    pub run_url: String,
}

/// Assemble the report, querying git for what changed.
///
/// Git query failures degrade to placeholders; a report is always produced.
pub fn compose_report<R: CommandRunner>(git: &Git<'_, R>, inputs: ReportInputs<'_>) -> Report {
    let changed_files = changed_files(git, inputs.scope);
    let diffstat = git.diff_stat().unwrap_or_else(|err| {
        warn!(err = %err, "diffstat query failed");
        String::new()
    });

    let log_tail = if inputs.build.log.trim().is_empty() {
        NO_OUTPUT_PLACEHOLDER.to_string()
    } else {
        inputs.build.tail.clone()
    };

    Report {
        issue: inputs.issue.clone(),
        plan: or_placeholder(inputs.plan, NO_PLAN_PLACEHOLDER).to_string(),
        changed_files: or_placeholder(&changed_files, NO_FILES_PLACEHOLDER).to_string(),
        diffstat: or_placeholder(&diffstat, NO_DIFFSTAT_PLACEHOLDER).to_string(),
        scope_warnings: inputs.scope.out_of_scope.clone(),
        build: BuildSummary {
            status: if inputs.build.success {
                BuildStatus::Passed
            } else {
                BuildStatus::Failed
            },
            command: inputs.build_command,
            log_tail,
        },
        run: RunMetadata {
            model: inputs.model.to_string(),
            trigger_label: inputs.issue.trigger_label.clone(),
            branch: inputs.issue.branch.clone(),
            run_url: inputs.run_url,
        },
    }
}

/// Tracked changes from `git diff --name-only`, plus files the patch created.
///
/// `git apply` leaves new files untracked, so they are picked up from
/// `git status` when the diff names them.
fn changed_files<R: CommandRunner>(git: &Git<'_, R>, scope: &ScopeReport) -> String {
    let mut files: Vec<String> = match git.changed_files() {
        Ok(names) => names
            .lines()
            .map(str::to_string)
            .filter(|l| !l.is_empty())
            .collect(),
        Err(err) => {
            warn!(err = %err, "changed-files query failed");
            Vec::new()
        }
    };
    match git.status_porcelain() {
        Ok(entries) => {
            for entry in entries {
                if entry.is_untracked()
                    && scope.touched.contains(&entry.path)
                    && !files.contains(&entry.path)
                {
                    files.push(entry.path);
                }
            }
        }
        Err(err) => debug!(err = %err, "status query failed"),
    }
    files.join("\n")
}

/// Render the report as markdown with a trailing newline.
pub fn render_report(report: &Report) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("report", REPORT_TEMPLATE)
        .context("load report template")?;
    let rendered = env
        .get_template("report")?
        .render(report)
        .context("render report")?;
    Ok(format!("{}\n", rendered.trim()))
}
