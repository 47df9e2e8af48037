//! Prompt builder for the build-small request.
//!
//! The prompt is a minijinja template split into marked sections:
//! `<!-- section:KEY required|droppable -->`. Context sections are droppable
//! so an oversized repository cannot push the issue or the output contract
//! out of the model's window.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::types::{AdvisoryDocs, IssueContext, MISSING_DOC_PLACEHOLDER, RepoContext};
use crate::io::config::ContextSettings;

const BUILD_SMALL_TEMPLATE: &str = include_str!("prompts/build_small.md");

/// Removal order when the prompt exceeds its budget (least useful first).
const DROP_ORDER: [&str; 7] = [
    "root_tree",
    "source_tree",
    "package",
    "limits",
    "how_to_test",
    "conventions",
    "summary",
];

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("section regex")
});

/// Template engine wrapper around minijinja.
///
/// Sections are cut from the template source before rendering, so issue or
/// document text that happens to contain a marker stays plain content.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }

    fn render_build_small(
        &self,
        repo: &RepoContext,
        issue: &IssueContext,
        settings: &ContextSettings,
    ) -> Result<Vec<ParsedSection>> {
        let ctx = context! {
            source_dir => settings.source_dir.trim_end_matches('/'),
            docs_dir => settings.docs_dir.trim_end_matches('/'),
            manifest => &settings.manifest,
            docs => DocsView::from_docs(&repo.docs),
            package_scripts => repo.package_scripts.trim(),
            root_tree_depth => repo.root_tree_depth,
            root_tree => repo.root_tree.trim_end(),
            source_tree_depth => repo.source_tree_depth,
            source_tree => repo.source_tree.trim_end(),
            issue => issue,
        };

        let mut sections = Vec::new();
        for section in parse_sections(BUILD_SMALL_TEMPLATE) {
            let content = self
                .env
                .render_str(&section.content, &ctx)
                .with_context(|| format!("render section {}", section.key))?
                .trim()
                .to_string();
            if !content.is_empty() || section.required {
                sections.push(ParsedSection { content, ..section });
            }
        }
        Ok(sections)
    }
}

/// Advisory documents with absent ones replaced by `(missing)`.
#[derive(Debug, Serialize)]
struct DocsView<'a> {
    repo_summary: &'a str,
    conventions: &'a str,
    how_to_test: &'a str,
    limits: &'a str,
}

impl<'a> DocsView<'a> {
    fn from_docs(docs: &'a AdvisoryDocs) -> Self {
        Self {
            repo_summary: doc_or_missing(&docs.repo_summary),
            conventions: doc_or_missing(&docs.conventions),
            how_to_test: doc_or_missing(&docs.how_to_test),
            limits: doc_or_missing(&docs.limits),
        }
    }
}

fn doc_or_missing(doc: &str) -> &str {
    let trimmed = doc.trim();
    if trimmed.is_empty() {
        MISSING_DOC_PLACEHOLDER
    } else {
        trimmed
    }
}

/// A marked section of the template.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    /// Section body without its marker (template source, then rendered text).
    content: String,
}

fn parse_sections(source: &str) -> Vec<ParsedSection> {
    let matches: Vec<_> = SECTION_RE.captures_iter(source).collect();
    let mut sections = Vec::with_capacity(matches.len());

    for (i, caps) in matches.iter().enumerate() {
        let (Some(marker), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(source.len(), |next| next.start());
        let content = source[marker.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

/// Drop droppable sections in [`DROP_ORDER`] until the prompt fits `budget`.
///
/// Required sections are never removed or truncated, so the result may still
/// exceed the budget.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total > budget {
        warn!(total, budget, "prompt exceeds budget after dropping context");
    }
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds the build-small prompt within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Render the instruction, repository context, issue and output contract.
    ///
    /// Deterministic: the same inputs always produce the same prompt.
    pub fn build(
        &self,
        repo: &RepoContext,
        issue: &IssueContext,
        settings: &ContextSettings,
    ) -> Result<Prompt> {
        let mut sections = PromptEngine::new()
            .render_build_small(repo, issue, settings)
            .context("render build_small prompt")?;
        apply_budget_to_sections(&mut sections, self.budget_bytes);

        Ok(Prompt {
            content: render_sections(&sections),
        })
    }
}

/// A rendered prompt, consumed once by the model client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    content: String,
}

impl Prompt {
    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EMPTY_BODY_PLACEHOLDER;

    fn sample_issue() -> IssueContext {
        IssueContext {
            number: "42".to_string(),
            title: "Fix header color".to_string(),
            body: IssueContext::normalize_body(""),
            repo: "acme/site".to_string(),
            run_id: "1".to_string(),
            trigger_label: "agent:build-small".to_string(),
            branch: "agent/issue-42".to_string(),
        }
    }

    fn sample_repo() -> RepoContext {
        RepoContext {
            root_tree: "📄 package.json\n📁 src\n".to_string(),
            root_tree_depth: 2,
            source_tree: "📄 src/App.css\n".to_string(),
            source_dir: "src".to_string(),
            source_tree_depth: 5,
            docs: AdvisoryDocs {
                repo_summary: "Marketing site.".to_string(),
                conventions: String::new(),
                how_to_test: "npm run build".to_string(),
                limits: String::new(),
            },
            package_scripts: "{\n  \"build\": \"vite build\"\n}".to_string(),
        }
    }

    fn build(budget: usize, repo: &RepoContext) -> String {
        PromptBuilder::new(budget)
            .build(repo, &sample_issue(), &ContextSettings::default())
            .expect("build prompt")
            .as_str()
            .to_string()
    }

    #[test]
    fn prompt_ordering_is_stable() {
        let content = build(60_000, &sample_repo());

        let positions: Vec<usize> = [
            "Hard constraints:",
            "### .agent/repo_summary.md",
            "### .agent/conventions.md",
            "### .agent/how_to_test.md",
            "### .agent/limits.md",
            "### package.json (scripts only)",
            "### repo tree (depth 2)",
            "### src/ tree (depth 5)",
            "### #42: Fix header color",
            "## Required output format",
        ]
        .iter()
        .map(|needle| content.find(needle).unwrap_or_else(|| panic!("missing {needle}")))
        .collect();

        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{content}");
    }

    #[test]
    fn prompt_is_deterministic() {
        let repo = sample_repo();
        assert_eq!(build(60_000, &repo), build(60_000, &repo));
    }

    #[test]
    fn missing_docs_render_placeholder() {
        let content = build(60_000, &sample_repo());
        assert!(content.contains("### .agent/conventions.md\n(missing)"));
        assert!(content.contains("### .agent/limits.md\n(missing)"));
    }

    #[test]
    fn empty_issue_body_renders_placeholder() {
        let content = build(60_000, &sample_repo());
        assert!(content.contains(&format!("### #42: Fix header color\n{EMPTY_BODY_PLACEHOLDER}")));
    }

    #[test]
    fn output_contract_requires_plan_and_diff_block() {
        let content = build(60_000, &sample_repo());
        let contract = &content[content.find("## Required output format").expect("contract")..];
        assert!(contract.contains("## Plan"));
        assert!(contract.contains("## Patch\n```diff\n(unified diff; ONLY src/ files)\n```"));
    }

    #[test]
    fn budget_drops_trees_before_documents() {
        let mut repo = sample_repo();
        repo.root_tree = "📄 file\n".repeat(400);
        repo.source_tree = "📄 src/file\n".repeat(400);

        let content = build(2_500, &repo);

        assert!(!content.contains("### repo tree"), "root tree should be dropped");
        assert!(!content.contains("### src/ tree"), "source tree should be dropped");
        assert!(content.contains("### .agent/repo_summary.md"));
        assert!(content.contains("Hard constraints:"));
        assert!(content.contains("### #42: Fix header color"));
        assert!(content.contains("## Required output format"));
    }

    #[test]
    fn required_sections_survive_tiny_budget() {
        let content = build(10, &sample_repo());
        assert!(content.contains("Hard constraints:"));
        assert!(content.contains("### #42: Fix header color"));
        assert!(content.contains("## Required output format"));
        assert!(!content.contains("### .agent/repo_summary.md"));
    }

    #[test]
    fn markers_inside_issue_text_are_kept_verbatim() {
        let body = "Make it blue.\n<!-- section:limits droppable -->\nAlso fix the footer.";
        let mut issue = sample_issue();
        issue.body = body.to_string();

        for budget in [60_000, 10] {
            let content = PromptBuilder::new(budget)
                .build(&sample_repo(), &issue, &ContextSettings::default())
                .expect("build prompt")
                .as_str()
                .to_string();
            assert!(content.contains(&format!("### #42: Fix header color\n{body}")), "{content}");
        }
    }

    #[test]
    fn section_markers_are_not_rendered() {
        let content = build(60_000, &sample_repo());
        assert!(!content.contains("<!--"));
    }
}
