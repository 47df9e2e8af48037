//! Orchestration for a single "build-small" run.
//!
//! Stages run strictly in order and each one either feeds the next or halts
//! the run with a [`PipelineError`]. Halts before the build never leave a
//! report behind; once the build ran, a report is always written.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::parser::parse_response;
use crate::core::scope::check_scope;
use crate::core::types::Report;
use crate::error::PipelineError;
use crate::exit_codes;
use crate::io::artifacts::ArtifactPaths;
use crate::io::build::validate_build;
use crate::io::config::{AgentConfig, AgentSettings};
use crate::io::context::collect_repo_context;
use crate::io::git::Git;
use crate::io::model::ModelClient;
use crate::io::process::CommandRunner;
use crate::io::prompt::PromptBuilder;
use crate::io::report::{ReportInputs, compose_report};

/// Result of a run that got as far as the build.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub report: Report,
    /// Markdown report location.
    pub report_path: PathBuf,
    pub build_passed: bool,
}

impl PipelineOutcome {
    pub fn exit_code(&self) -> i32 {
        if self.build_passed {
            exit_codes::OK
        } else {
            exit_codes::BUILD_FAILED
        }
    }
}

/// Run the pipeline against the checkout at `root`.
///
/// `runner` must execute commands inside `root`.
pub fn run_pipeline<M: ModelClient, R: CommandRunner>(
    root: &Path,
    config: &AgentConfig,
    settings: &AgentSettings,
    model: &M,
    runner: &R,
) -> Result<PipelineOutcome, PipelineError> {
    settings
        .validate()
        .map_err(|err| PipelineError::Configuration(format!("{err:#}")))?;
    let artifacts = ArtifactPaths::new(root, &settings.artifacts);

    info!(root = %root.display(), issue = %config.issue.number, "collecting repository context");
    let repo = collect_repo_context(root, &settings.context);

    let prompt = PromptBuilder::new(settings.context.prompt_budget_bytes).build(
        &repo,
        &config.issue,
        &settings.context,
    )?;
    info!(prompt_bytes = prompt.len(), "prompt ready");

    let raw = model.generate(prompt.as_str(), &config.model, &settings.model.sampling)?;
    info!(response_bytes = raw.len(), "model responded");

    let proposal = parse_response(&raw);
    let Some(diff) = proposal.diff else {
        warn!("response has no diff block");
        return Err(PipelineError::Parse { raw });
    };
    artifacts.write_plan(&proposal.plan)?;
    info!(path = %artifacts.plan.display(), "wrote plan");

    let scope = check_scope(&diff, &settings.scope.allowed);
    if !scope.is_clean() {
        warn!(paths = ?scope.out_of_scope, "diff touches paths outside the allowed scope");
    }

    info!(files = scope.touched.len(), "applying patch");
    let git = Git::new(runner);
    let applied = git.apply_patch(&diff, settings.commands.patch_directory.as_deref())?;
    if !applied.success {
        artifacts.write_failed_patch(&diff)?;
        warn!(path = %artifacts.failed_patch.display(), "saved rejected patch");
        return Err(PipelineError::Apply {
            stderr: applied.stderr,
            artifact: artifacts.failed_patch.clone(),
        });
    }

    let build = validate_build(runner, &settings.commands)?;

    let report = compose_report(
        &git,
        ReportInputs {
            issue: &config.issue,
            plan: &proposal.plan,
            scope: &scope,
            build: &build,
            build_command: settings.build_command_display(),
            model: &config.model,
            run_url: config.run_url(),
        },
    );
    artifacts.write_report(&report)?;
    info!(path = %artifacts.report.display(), build_passed = build.success, "wrote report");

    Ok(PipelineOutcome {
        build_passed: report.build_passed(),
        report,
        report_path: artifacts.report,
    })
}
