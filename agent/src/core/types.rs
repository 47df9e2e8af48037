//! Shared record types for the agent pipeline.
//!
//! Every value here is built once per run and never mutated afterwards; stages
//! hand them forward by reference.

use serde::{Deserialize, Serialize};

/// Substituted for an empty issue body.
pub const EMPTY_BODY_PLACEHOLDER: &str = "_(No issue description provided)_";

/// Rendered in place of an advisory document that does not exist.
pub const MISSING_DOC_PLACEHOLDER: &str = "(missing)";

/// The issue that triggered this run, plus where the run happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueContext {
    pub number: String,
    pub title: String,
    /// Never empty: blank bodies are replaced with [`EMPTY_BODY_PLACEHOLDER`].
    pub body: String,
    /// `owner/name` of the repository.
    pub repo: String,
    pub run_id: String,
    pub trigger_label: String,
    pub branch: String,
}

impl IssueContext {
    /// Replace a blank body with the placeholder sentinel.
    pub fn normalize_body(body: &str) -> String {
        if body.trim().is_empty() {
            EMPTY_BODY_PLACEHOLDER.to_string()
        } else {
            body.to_string()
        }
    }
}

/// Advisory documents under `.agent/`. Empty strings mean "absent".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdvisoryDocs {
    pub repo_summary: String,
    pub conventions: String,
    pub how_to_test: String,
    pub limits: String,
}

/// Read-only text snapshot of the repository used for prompting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepoContext {
    /// Listing of the repository root.
    pub root_tree: String,
    pub root_tree_depth: usize,
    /// Listing of the application source directory.
    pub source_tree: String,
    pub source_dir: String,
    pub source_tree_depth: usize,
    pub docs: AdvisoryDocs,
    /// `scripts` of the package manifest (or the raw manifest).
    pub package_scripts: String,
}

/// What the model proposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedProposal {
    /// Response text with the diff block removed.
    pub plan: String,
    /// Trimmed interior of the first ```` ```diff ```` block.
    pub diff: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub success: bool,
    /// Full captured build output (stdout, then stderr).
    pub log: String,
    /// Last lines of `log` for the report.
    pub tail: String,
}

/// Paths a diff touches, and those outside the allowed scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScopeReport {
    pub touched: Vec<String>,
    pub out_of_scope: Vec<String>,
}

impl ScopeReport {
    pub fn is_clean(&self) -> bool {
        self.out_of_scope.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    pub status: BuildStatus,
    /// Display form of the build command, e.g. `npm run build`.
    pub command: String,
    pub log_tail: String,
}

/// Provenance of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunMetadata {
    pub model: String,
    pub trigger_label: String,
    pub branch: String,
    pub run_url: String,
}

/// Final artifact handed to the PR creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub issue: IssueContext,
    pub plan: String,
    pub changed_files: String,
    pub diffstat: String,
    pub scope_warnings: Vec<String>,
    pub build: BuildSummary,
    pub run: RunMetadata,
}

impl Report {
    pub fn build_passed(&self) -> bool {
        self.build.status == BuildStatus::Passed
    }
}
