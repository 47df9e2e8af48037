//! Repository context collection for the prompt.
//!
//! Nothing here fails: an unreadable directory lists as empty and a missing
//! document reads as `""`. Absence is data the prompt reports as `(missing)`.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::core::types::{AdvisoryDocs, RepoContext};
use crate::io::config::ContextSettings;

/// Directory names never listed, at any depth.
pub const NOISE_DIRS: &[&str] = &[".git", "node_modules", "dist"];

/// List `base/dir` as an indented tree, sorted by file name.
///
/// Each line is `{indent}{icon} {path}` with two spaces of indent per level,
/// `📁` for directories, `📄` for everything else, and `path` relative to
/// `base`. Levels `0..=max_depth` below `dir` are listed; anything deeper is
/// dropped without notice.
pub fn list_tree(base: &Path, dir: &str, max_depth: usize) -> String {
    let start = base.join(dir);
    let mut out = String::new();
    let walker = WalkDir::new(&start)
        .min_depth(1)
        .max_depth(max_depth + 1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_noise(entry));

    for entry in walker.filter_map(Result::ok) {
        let rel = entry.path().strip_prefix(base).unwrap_or(entry.path());
        let display = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .filter(|part| part != ".")
            .collect::<Vec<_>>()
            .join("/");
        let icon = if entry.file_type().is_dir() {
            "📁"
        } else {
            "📄"
        };
        out.push_str(&"  ".repeat(entry.depth() - 1));
        out.push_str(icon);
        out.push(' ');
        out.push_str(&display);
        out.push('\n');
    }
    out
}

fn is_noise(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| NOISE_DIRS.contains(&name))
}

/// Read a text file, or `""` if it is missing or unreadable.
pub fn read_or_empty(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            debug!(path = %path.display(), err = %err, "context file unavailable");
            String::new()
        }
    }
}

/// The `scripts` table of a package manifest, pretty-printed.
///
/// Falls back to the raw manifest when it is not JSON or has no `scripts`.
pub fn package_scripts(manifest: &str) -> String {
    if manifest.trim().is_empty() {
        return String::new();
    }
    let scripts = serde_json::from_str::<Value>(manifest)
        .ok()
        .and_then(|value| value.get("scripts").cloned())
        .and_then(|scripts| serde_json::to_string_pretty(&scripts).ok());
    match scripts {
        Some(pretty) => pretty,
        None => manifest.to_string(),
    }
}

/// Gather everything the prompt needs from the working tree at `root`.
pub fn collect_repo_context(root: &Path, settings: &ContextSettings) -> RepoContext {
    let docs_dir = root.join(&settings.docs_dir);
    let docs = AdvisoryDocs {
        repo_summary: read_or_empty(&docs_dir.join("repo_summary.md")),
        conventions: read_or_empty(&docs_dir.join("conventions.md")),
        how_to_test: read_or_empty(&docs_dir.join("how_to_test.md")),
        limits: read_or_empty(&docs_dir.join("limits.md")),
    };
    let manifest = read_or_empty(&root.join(&settings.manifest));

    let context = RepoContext {
        root_tree: list_tree(root, ".", settings.root_tree_depth),
        root_tree_depth: settings.root_tree_depth,
        source_tree: list_tree(root, &settings.source_dir, settings.source_tree_depth),
        source_dir: settings.source_dir.clone(),
        source_tree_depth: settings.source_tree_depth,
        docs,
        package_scripts: package_scripts(&manifest),
    };
    debug!(
        root_tree_bytes = context.root_tree.len(),
        source_tree_bytes = context.source_tree.len(),
        "collected repo context"
    );
    context
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create dir");
        }
        fs::write(path, "x").expect("write file");
    }

    #[test]
    fn tree_is_sorted_and_indented() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        touch(root, "src/main.tsx");
        touch(root, "src/App.css");
        touch(root, "src/components/Header.tsx");

        let tree = list_tree(root, "src", 5);

        assert_eq!(
            tree,
            "📄 src/App.css\n📁 src/components\n  📄 src/components/Header.tsx\n📄 src/main.tsx\n"
        );
    }

    #[test]
    fn root_listing_has_no_dot_prefix() {
        let temp = tempfile::tempdir().expect("tempdir");
        touch(temp.path(), "package.json");
        let tree = list_tree(temp.path(), ".", 2);
        assert_eq!(tree, "📄 package.json\n");
    }

    #[test]
    fn noise_dirs_are_excluded_at_any_depth() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        touch(root, ".git/HEAD");
        touch(root, "node_modules/react/index.js");
        touch(root, "dist/index.html");
        touch(root, "src/lib/node_modules/inner.js");
        touch(root, "src/lib/dist/out.js");
        touch(root, "src/lib/util.ts");

        let tree = list_tree(root, ".", 5);

        for noise in NOISE_DIRS {
            assert!(!tree.contains(noise), "{noise} should be excluded:\n{tree}");
        }
        assert!(tree.contains("src/lib/util.ts"));
    }

    #[test]
    fn depth_bound_truncates_silently() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        touch(root, "a/b/c/deep.txt");

        let tree = list_tree(root, ".", 1);

        assert!(tree.contains("📁 a\n"));
        assert!(tree.contains("  📁 a/b\n"));
        assert!(!tree.contains("a/b/c"));
    }

    #[test]
    fn listing_is_deterministic() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        for name in ["zeta.ts", "alpha.ts", "Mid.ts", "beta/x.ts"] {
            touch(root, &format!("src/{name}"));
        }
        let first = list_tree(root, "src", 5);
        let second = list_tree(root, "src", 5);
        assert_eq!(first, second);
    }

    #[test]
    fn missing_directory_lists_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(list_tree(temp.path(), "src", 5), "");
    }

    #[test]
    fn missing_document_reads_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(read_or_empty(&temp.path().join(".agent/limits.md")), "");
    }

    #[test]
    fn package_scripts_extracts_scripts_table() {
        let manifest = r#"{"name":"site","scripts":{"build":"vite build"},"dependencies":{"react":"18"}}"#;
        let scripts = package_scripts(manifest);
        assert!(scripts.contains("\"build\": \"vite build\""));
        assert!(!scripts.contains("react"));
    }

    #[test]
    fn package_scripts_falls_back_to_raw_text() {
        assert_eq!(package_scripts("not json"), "not json");
        assert_eq!(package_scripts(""), "");
    }

    #[test]
    fn collect_reads_docs_and_trees() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        touch(root, "src/App.tsx");
        fs::create_dir_all(root.join(".agent")).expect("agent dir");
        fs::write(root.join(".agent/conventions.md"), "Use CSS modules.").expect("write");

        let context = collect_repo_context(root, &ContextSettings::default());

        assert_eq!(context.docs.conventions, "Use CSS modules.");
        assert_eq!(context.docs.limits, "");
        assert!(context.source_tree.contains("src/App.tsx"));
        assert!(context.root_tree.contains("📁 .agent"));
    }
}
