//! Small text helpers for bounded, human-readable output.

/// Return the last `lines` lines of `text` (split on `\n`).
///
/// A trailing newline counts as an empty final line, so the tail of
/// `"a\nb\n"` with `lines = 1` is `""`; callers trim first when that matters.
pub fn tail_lines(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.split('\n').collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

/// Return `value` unless it is blank, in which case return `placeholder`.
pub fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}
