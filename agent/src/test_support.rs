//! Test-only helpers: scripted runner and model, sample records, scratch repos.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use tempfile::TempDir;

use crate::core::types::IssueContext;
use crate::error::TransportError;
use crate::io::config::SamplingConfig;
use crate::io::model::ModelClient;
use crate::io::process::{CommandResult, CommandRunner, CommandSpec};

/// Issue #42 "Fix header color" with an empty body.
pub fn sample_issue() -> IssueContext {
    IssueContext {
        number: "42".to_string(),
        title: "Fix header color".to_string(),
        body: IssueContext::normalize_body(""),
        repo: "acme/site".to_string(),
        run_id: "7".to_string(),
        trigger_label: "agent:build-small".to_string(),
        branch: "agent/issue-42".to_string(),
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Result(CommandResult),
    SpawnError,
}

/// Command runner that records every invocation and answers from a script.
///
/// Rules match on the command's display form (`git diff --stat`) by prefix;
/// the first matching rule wins. Unscripted commands succeed with no output.
#[derive(Debug, Default)]
pub struct FakeRunner {
    rules: Vec<(String, Scripted)>,
    calls: RefCell<Vec<CommandSpec>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed with `stdout`.
    pub fn respond(self, prefix: &str, stdout: &str) -> Self {
        self.with_rule(
            prefix,
            Scripted::Result(CommandResult {
                exit_code: Some(0),
                stdout: stdout.to_string(),
                ..CommandResult::default()
            }),
        )
    }

    /// Exit with `code` and `stderr`.
    pub fn fail(self, prefix: &str, code: i32, stderr: &str) -> Self {
        self.with_rule(
            prefix,
            Scripted::Result(CommandResult {
                exit_code: Some(code),
                stderr: stderr.to_string(),
                ..CommandResult::default()
            }),
        )
    }

    /// Killed after exceeding the timeout, with partial `stdout`.
    pub fn timeout(self, prefix: &str, stdout: &str) -> Self {
        self.with_rule(
            prefix,
            Scripted::Result(CommandResult {
                exit_code: None,
                stdout: stdout.to_string(),
                timed_out: true,
                ..CommandResult::default()
            }),
        )
    }

    /// The program cannot be started.
    pub fn spawn_error(self, prefix: &str) -> Self {
        self.with_rule(prefix, Scripted::SpawnError)
    }

    fn with_rule(mut self, prefix: &str, scripted: Scripted) -> Self {
        self.rules.push((prefix.to_string(), scripted));
        self
    }

    /// Every invocation so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    /// Whether any invocation's display form starts with `prefix`.
    pub fn invoked(&self, prefix: &str) -> bool {
        self.calls
            .borrow()
            .iter()
            .any(|spec| spec.to_string().starts_with(prefix))
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandResult> {
        self.calls.borrow_mut().push(spec.clone());
        let line = spec.to_string();
        let scripted = self
            .rules
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, scripted)| scripted.clone());
        match scripted {
            Some(Scripted::Result(result)) => Ok(result),
            Some(Scripted::SpawnError) => Err(anyhow!(
                "spawn {}: No such file or directory",
                spec.program
            )),
            None => Ok(CommandResult {
                exit_code: Some(0),
                ..CommandResult::default()
            }),
        }
    }
}

/// Model client that answers from a queue and records prompts.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: RefCell<VecDeque<Result<String, TransportError>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String, TransportError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// A single successful response.
    pub fn reply(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    /// A single provider error.
    pub fn failing(status: u16, body: &str) -> Self {
        Self::new(vec![Err(TransportError {
            status: Some(status),
            body: body.to_string(),
        })])
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn assert_drained(&self) -> Result<()> {
        let left = self.responses.borrow().len();
        if left > 0 {
            bail!("{left} scripted model responses were not consumed");
        }
        Ok(())
    }
}

impl ModelClient for ScriptedModel {
    fn generate(
        &self,
        prompt: &str,
        _model: &str,
        _sampling: &SamplingConfig,
    ) -> Result<String, TransportError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError {
                    status: None,
                    body: "no scripted response left".to_string(),
                })
            })
    }
}

/// Scratch checkout of a small Vite project.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let repo = Self { dir };
        repo.write(
            "package.json",
            r#"{
  "name": "site",
  "private": true,
  "scripts": {
    "dev": "vite",
    "build": "tsc && vite build"
  }
}
"#,
        )?;
        repo.write("src/App.css", "h1 { color: red; }\n")?;
        repo.write("src/App.tsx", "export default function App() { return <h1>Hi</h1>; }\n")?;
        repo.write("src/main.tsx", "import App from './App';\n")?;
        repo.write(".agent/repo_summary.md", "Marketing site built with Vite.\n")?;
        repo.write(".agent/how_to_test.md", "Run `npm run build`.\n")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        let path = self.dir.path().join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.dir.path().join(rel).exists()
    }
}
