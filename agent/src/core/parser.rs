//! Extraction of the plan narrative and patch from a model response.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::ParsedProposal;

static DIFF_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```diff\b\s*(.*?)```").expect("diff block regex"));

/// Split a raw response into plan text and the first fenced `diff` block.
///
/// - The diff is the trimmed interior of the first block tagged `diff`
///   (case-insensitive); fence markers are never included.
/// - The plan is the response with that block removed, trimmed.
/// - Without a block (or with an empty one) the diff is `None` and the plan
///   is the raw response, unchanged.
pub fn parse_response(raw: &str) -> ParsedProposal {
    let Some(caps) = DIFF_BLOCK_RE.captures(raw) else {
        return no_patch(raw);
    };
    let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
        return no_patch(raw);
    };

    let diff = inner.as_str().trim();
    if diff.is_empty() {
        return no_patch(raw);
    }

    let mut plan = String::with_capacity(raw.len() - whole.len());
    plan.push_str(&raw[..whole.start()]);
    plan.push_str(&raw[whole.end()..]);

    ParsedProposal {
        plan: plan.trim().to_string(),
        diff: Some(diff.to_string()),
    }
}

fn no_patch(raw: &str) -> ParsedProposal {
    ParsedProposal {
        plan: raw.to_string(),
        diff: None,
    }
}
