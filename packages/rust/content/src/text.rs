//! Text cleanup and bounding helpers for model prompts and responses.

use std::sync::LazyLock;

use regex::Regex;

/// Appended when content is cut to fit a prompt.
const TRUNCATION_MARKER: &str = "\n\n[... truncated to fit the prompt ...]";

/// Remove a markdown code fence wrapped around the whole text.
///
/// Handles an opening fence with an optional language tag (```` ```html ````,
/// ```` ```json ````) and a closing fence, each on its own line. The closing fence
/// is only removed when an opening one was; fences inside the text are left alone.
/// Surrounding whitespace is trimmed.
pub fn strip_code_fences(text: &str) -> String {
    static OPEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\A\s*```[\w-]*[ \t]*(?:\r?\n|\z)").expect("valid regex"));
    static CLOSE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?:\r?\n|\A)[ \t]*```\s*\z").expect("valid regex"));

    let Some(open) = OPEN_RE.find(text) else {
        return text.trim().to_string();
    };
    let body = &text[open.end()..];
    CLOSE_RE.replace(body, "").trim().to_string()
}

/// Longest prefix of `text` that is at most `max_bytes` long and ends on a char boundary.
pub fn truncate(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Like [`truncate`], but marks the cut so the model knows text is missing.
pub fn truncate_with_marker(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        text.to_string()
    } else {
        format!("{}{TRUNCATION_MARKER}", truncate(text, max_bytes))
    }
}

/// The span from the first `[` to the last `]`, if both exist in that order.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}
