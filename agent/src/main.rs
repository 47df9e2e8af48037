//! Issue-driven "build-small" agent.
//!
//! `agent run` turns the triggering issue into a plan and patch, applies it,
//! builds, and writes the report for the PR creator. `plan-comment` and
//! `pr-body` render the non-LLM workflow texts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use agent::error::PipelineError;
use agent::exit_codes;
use agent::io::artifacts::write_text;
use agent::io::config::{
    AgentConfig, DEFAULT_SERVER_URL, DEFAULT_SETTINGS_PATH, issue_from_env, load_settings, run_url,
};
use agent::io::model::GeminiClient;
use agent::io::process::SystemRunner;
use agent::logging;
use agent::pipeline::run_pipeline;
use agent::render::{PrMode, render_plan_comment, render_pr_body};
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "agent",
    version,
    about = "Issue-to-patch agent: plan, apply, build, report"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask the model for a plan and patch, apply it, build, and write the report.
    Run {
        /// Repository checkout to work in.
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Settings file (default: `.agent/agent.toml` under the root).
        #[arg(long)]
        settings: Option<PathBuf>,
    },
    /// Write the placeholder plan comment for plan-only runs.
    PlanComment {
        #[arg(long, default_value = "plan_comment.md")]
        out: PathBuf,
    },
    /// Write a PR body for smoke, research, or build workflows.
    PrBody {
        /// Defaults to the `MODE` environment variable, then `smoke`.
        #[arg(long, value_enum)]
        mode: Option<PrMode>,
        #[arg(long, default_value = "pr_body.md")]
        out: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init();

    let code = match cli.command {
        Command::Run { root, settings } => cmd_run(&root, settings.as_deref()),
        Command::PlanComment { out } => report_result(cmd_plan_comment(&out)),
        Command::PrBody { mode, out } => report_result(cmd_pr_body(mode, &out)),
    };
    std::process::exit(code);
}

fn report_result(result: Result<()>) -> i32 {
    match result {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::FAILURE
        }
    }
}

fn cmd_run(root: &Path, settings_path: Option<&Path>) -> i32 {
    match try_run(root, settings_path) {
        Ok(code) => code,
        Err(err) => {
            error!(kind = err.kind(), "run halted");
            eprintln!("{err:#}");
            err.exit_code()
        }
    }
}

fn try_run(root: &Path, settings_path: Option<&Path>) -> Result<i32, PipelineError> {
    // Credential check comes first so a misconfigured run touches nothing.
    let config = AgentConfig::from_env()?;
    let settings_path = settings_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.join(DEFAULT_SETTINGS_PATH));
    let settings = load_settings(&settings_path)
        .map_err(|err| PipelineError::Configuration(format!("{err:#}")))?;

    let model = GeminiClient::new(
        &settings.model.base_url,
        &config.api_key,
        Duration::from_secs(settings.model.request_timeout_secs),
    )?;
    let runner = SystemRunner::new(
        root,
        settings.commands.timeout(),
        settings.commands.output_limit_bytes,
    );

    let outcome = run_pipeline(root, &config, &settings, &model, &runner)?;
    info!(
        report = %outcome.report_path.display(),
        build_passed = outcome.build_passed,
        "run finished"
    );
    Ok(outcome.exit_code())
}

fn server_url_from_env() -> String {
    std::env::var("GITHUB_SERVER_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
}

fn cmd_plan_comment(out: &Path) -> Result<()> {
    let issue = issue_from_env();
    let url = run_url(&server_url_from_env(), &issue.repo, &issue.run_id);
    write_text(out, &render_plan_comment(&issue, &url)?)?;
    println!("Wrote {}", out.display());
    Ok(())
}

fn cmd_pr_body(mode: Option<PrMode>, out: &Path) -> Result<()> {
    let mode =
        mode.unwrap_or_else(|| PrMode::from_env_value(std::env::var("MODE").ok().as_deref()));
    let issue = issue_from_env();
    let url = run_url(&server_url_from_env(), &issue.repo, &issue.run_id);
    write_text(out, &render_pr_body(&issue, mode, &url)?)?;
    println!("Wrote {}", out.display());
    Ok(())
}
