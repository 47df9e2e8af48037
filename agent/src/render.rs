//! Non-LLM renderers used by the plan-only and smoke workflows.

use anyhow::{Context, Result};
use clap::ValueEnum;
use minijinja::{Environment, context};

use crate::core::types::IssueContext;

const PLAN_COMMENT_TEMPLATE: &str = include_str!("io/templates/plan_comment.md");
const PR_BODY_TEMPLATE: &str = include_str!("io/templates/pr_body.md");

/// Which workflow produced the pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PrMode {
    Smoke,
    Research,
    Build,
}

impl PrMode {
    /// Interpret `MODE`: unset means smoke; any value other than the exact
    /// `smoke` or `research`, including an empty one, means a real build.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            None | Some("smoke") => PrMode::Smoke,
            Some("research") => PrMode::Research,
            Some(_) => PrMode::Build,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PrMode::Smoke => "smoke",
            PrMode::Research => "research",
            PrMode::Build => "build",
        }
    }
}

fn render(name: &str, source: &str, ctx: minijinja::Value) -> Result<String> {
    let mut env = Environment::new();
    env.add_template(name, source)
        .with_context(|| format!("load {name} template"))?;
    let rendered = env
        .get_template(name)?
        .render(ctx)
        .with_context(|| format!("render {name}"))?;
    Ok(format!("{}\n", rendered.trim()))
}

/// Placeholder plan comment posted on plan-only runs.
pub fn render_plan_comment(issue: &IssueContext, run_url: &str) -> Result<String> {
    render(
        "plan_comment",
        PLAN_COMMENT_TEMPLATE,
        context! { issue => issue, run_url => run_url },
    )
}

/// PR body for workflows that open a pull request without a report.
pub fn render_pr_body(issue: &IssueContext, mode: PrMode, run_url: &str) -> Result<String> {
    render(
        "pr_body",
        PR_BODY_TEMPLATE,
        context! { issue => issue, mode => mode.as_str(), run_url => run_url },
    )
}
