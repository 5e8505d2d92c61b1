//! Shared string helpers for the sitegen crate.

use std::sync::LazyLock;

use regex::Regex;

static CODE_FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:json|html)?\s*(.*?)\s*```").unwrap());

/// Reduce a client identifier to `[a-zA-Z0-9-]`, collapsing separator runs
/// and trimming separators from both ends. An empty result means the
/// identifier is unusable.
pub fn sanitize_client_id(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.trim().chars() {
        let mapped = if ch.is_ascii_alphanumeric() { ch } else { '-' };
        if mapped == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(mapped);
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Return the body of the first fenced code block, or the trimmed text
/// when there is none.
pub fn strip_code_fence(text: &str) -> String {
    match CODE_FENCE_REGEX.captures(text) {
        Some(caps) => caps[1].trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Slice from the first `{` to the last `}` inclusive.
pub fn outer_brace_span(text: &str) -> Option<&str> {
    let first = text.find('{')?;
    let last = text.rfind('}')?;
    if last > first {
        Some(&text[first..=last])
    } else {
        None
    }
}

/// Keep at most `max_chars` characters. Zero means no limit.
pub fn clip_chars(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return text;
    }
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
