//! Run configuration: environment parameters and the optional settings file.
//!
//! Both are read once at startup and passed explicitly through the pipeline;
//! no stage looks at the environment on its own.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::IssueContext;
use crate::error::PipelineError;

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_SERVER_URL: &str = "https://github.com";
/// Settings file location relative to the repository root.
pub const DEFAULT_SETTINGS_PATH: &str = ".agent/agent.toml";

/// Parameters supplied by the CI trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub api_key: String,
    pub model: String,
    pub issue: IssueContext,
    /// Base URL of the hosting service, used for the run link.
    pub server_url: String,
}

impl AgentConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup` (returns `None` for unset names).
    ///
    /// Fails only when the model credential is missing or blank; every other
    /// parameter has a default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Configuration(format!("missing {API_KEY_VAR} (add repo secret)"))
            })?;
        let get = |name: &str| lookup(name).unwrap_or_default();
        let model = lookup("GEMINI_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let server_url = lookup("GITHUB_SERVER_URL")
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        Ok(Self {
            api_key,
            model,
            issue: issue_from_lookup(&get),
            server_url,
        })
    }

    /// Link to the CI run that produced this proposal.
    pub fn run_url(&self) -> String {
        run_url(&self.server_url, &self.issue.repo, &self.issue.run_id)
    }
}

/// Issue parameters only; used by the non-LLM renderers, which need no credential.
pub fn issue_from_env() -> IssueContext {
    issue_from_lookup(&|name: &str| std::env::var(name).unwrap_or_default())
}

fn issue_from_lookup(get: &dyn Fn(&str) -> String) -> IssueContext {
    IssueContext {
        number: get("ISSUE_NUMBER"),
        title: get("ISSUE_TITLE"),
        body: IssueContext::normalize_body(&get("ISSUE_BODY")),
        repo: get("REPO"),
        run_id: get("RUN_ID"),
        trigger_label: get("TRIGGER_LABEL"),
        branch: get("BRANCH_NAME"),
    }
}

pub fn run_url(server_url: &str, repo: &str, run_id: &str) -> String {
    format!(
        "{}/{}/actions/runs/{}",
        server_url.trim_end_matches('/'),
        repo,
        run_id
    )
}

/// Tunables for one repository (TOML).
///
/// Missing fields default to values suited to a React + Vite project built
/// with npm.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSettings {
    pub commands: CommandSettings,
    pub context: ContextSettings,
    pub scope: ScopeSettings,
    pub model: ModelSettings,
    pub artifacts: ArtifactSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandSettings {
    /// Dependency installation argv.
    pub install: Vec<String>,
    /// Build argv.
    pub build: Vec<String>,
    /// Per-command wall-clock limit.
    pub timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes per stream.
    pub output_limit_bytes: usize,
    /// Lines of build output kept in the report.
    pub log_tail_lines: usize,
    /// Passed to `git apply --directory` when the app lives in a subtree.
    pub patch_directory: Option<String>,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            install: vec!["npm".to_string(), "ci".to_string()],
            build: vec!["npm".to_string(), "run".to_string(), "build".to_string()],
            timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
            log_tail_lines: 120,
            patch_directory: None,
        }
    }
}

impl CommandSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContextSettings {
    /// Application source directory listed in detail.
    pub source_dir: String,
    pub source_tree_depth: usize,
    pub root_tree_depth: usize,
    /// Directory holding the advisory documents.
    pub docs_dir: String,
    pub manifest: String,
    /// Prompt byte budget before droppable sections are removed.
    pub prompt_budget_bytes: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            source_dir: "src".to_string(),
            source_tree_depth: 5,
            root_tree_depth: 2,
            docs_dir: ".agent".to_string(),
            manifest: "package.json".to_string(),
            prompt_budget_bytes: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScopeSettings {
    /// Directory prefixes (ending in `/`) or exact files the diff may touch.
    pub allowed: Vec<String>,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            allowed: vec!["src/".to_string(), "README.md".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub sampling: SamplingConfig,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            request_timeout_secs: 120,
            sampling: SamplingConfig::default(),
        }
    }
}

/// Low-temperature, bounded-length sampling favoring determinism and cost.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.9,
            max_output_tokens: 1400,
        }
    }
}

/// Output file locations, relative to the repository root unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArtifactSettings {
    pub plan: PathBuf,
    pub failed_patch: PathBuf,
    pub report: PathBuf,
    pub report_json: PathBuf,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            plan: PathBuf::from("agent_plan.md"),
            failed_patch: PathBuf::from("agent_patch_failed.diff"),
            report: PathBuf::from("pr_body.md"),
            report_json: PathBuf::from("agent_report.json"),
        }
    }
}

impl AgentSettings {
    pub fn validate(&self) -> Result<()> {
        if self.commands.install.is_empty() || self.commands.install[0].trim().is_empty() {
            return Err(anyhow!("commands.install must be a non-empty array"));
        }
        if self.commands.build.is_empty() || self.commands.build[0].trim().is_empty() {
            return Err(anyhow!("commands.build must be a non-empty array"));
        }
        if self.commands.timeout_secs == 0 {
            return Err(anyhow!("commands.timeout_secs must be > 0"));
        }
        if self.commands.output_limit_bytes == 0 {
            return Err(anyhow!("commands.output_limit_bytes must be > 0"));
        }
        if self.model.request_timeout_secs == 0 {
            return Err(anyhow!("model.request_timeout_secs must be > 0"));
        }
        if self.model.sampling.max_output_tokens == 0 {
            return Err(anyhow!("model.sampling.max_output_tokens must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.model.sampling.temperature) {
            return Err(anyhow!("model.sampling.temperature must be within 0.0..=2.0"));
        }
        if !(0.0..=1.0).contains(&self.model.sampling.top_p) {
            return Err(anyhow!("model.sampling.top_p must be within 0.0..=1.0"));
        }
        if self.scope.allowed.iter().any(|entry| entry.trim().is_empty()) {
            return Err(anyhow!("scope.allowed entries must be non-empty"));
        }
        Ok(())
    }

    /// Display form of the build command for the report.
    pub fn build_command_display(&self) -> String {
        self.commands.build.join(" ")
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `AgentSettings::default()`.
pub fn load_settings(path: &Path) -> Result<AgentSettings> {
    if !path.exists() {
        let settings = AgentSettings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: AgentSettings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::core::types::EMPTY_BODY_PLACEHOLDER;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_api_key_is_configuration_error() {
        let err = AgentConfig::from_lookup(lookup_from(&[("ISSUE_NUMBER", "42")])).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains(API_KEY_VAR));
    }

    #[test]
    fn blank_api_key_is_configuration_error() {
        let err = AgentConfig::from_lookup(lookup_from(&[(API_KEY_VAR, "  ")])).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn defaults_fill_optional_parameters() {
        let cfg = AgentConfig::from_lookup(lookup_from(&[(API_KEY_VAR, "k")])).expect("config");
        assert_eq!(cfg.model, DEFAULT_MODEL);
        assert_eq!(cfg.server_url, DEFAULT_SERVER_URL);
        assert_eq!(cfg.issue.body, EMPTY_BODY_PLACEHOLDER);
        assert_eq!(cfg.issue.title, "");
    }

    #[test]
    fn issue_fields_come_from_environment_names() {
        let cfg = AgentConfig::from_lookup(lookup_from(&[
            (API_KEY_VAR, "k"),
            ("GEMINI_MODEL", "gemini-2.0-flash"),
            ("ISSUE_NUMBER", "42"),
            ("ISSUE_TITLE", "Fix header color"),
            ("ISSUE_BODY", "Header should be blue."),
            ("REPO", "acme/site"),
            ("RUN_ID", "9001"),
            ("TRIGGER_LABEL", "agent:build-small"),
            ("BRANCH_NAME", "agent/issue-42"),
        ]))
        .expect("config");

        assert_eq!(cfg.model, "gemini-2.0-flash");
        assert_eq!(cfg.issue.number, "42");
        assert_eq!(cfg.issue.body, "Header should be blue.");
        assert_eq!(cfg.issue.branch, "agent/issue-42");
        assert_eq!(
            cfg.run_url(),
            "https://github.com/acme/site/actions/runs/9001"
        );
    }

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = load_settings(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(settings, AgentSettings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent.toml");
        fs::write(
            &path,
            "[commands]\nbuild = [\"pnpm\", \"build\"]\n\n[model.sampling]\ntemperature = 0.0\n",
        )
        .expect("write");

        let settings = load_settings(&path).expect("load");
        assert_eq!(settings.commands.build, vec!["pnpm", "build"]);
        assert_eq!(settings.commands.install, vec!["npm", "ci"]);
        assert_eq!(settings.model.sampling.temperature, 0.0);
        assert_eq!(settings.model.sampling.max_output_tokens, 1400);
        assert_eq!(settings.build_command_display(), "pnpm build");
    }

    #[test]
    fn empty_build_command_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent.toml");
        fs::write(&path, "[commands]\nbuild = []\n").expect("write");

        let err = load_settings(&path).unwrap_err();
        assert!(err.to_string().contains("commands.build"));
    }
}
