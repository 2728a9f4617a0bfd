//! Command output sanitizing

/// Longest output kept in a command result, in characters
pub const MAX_OUTPUT_CHARS: usize = 500;

const TRUNCATION_MARKER: &str = "... (truncated)";

/// Strip markup tags, trim, and cap the length
pub fn sanitize_output(raw: &str) -> String {
    let stripped = strip_tags(raw);
    let trimmed = stripped.trim();

    match trimmed.char_indices().nth(MAX_OUTPUT_CHARS) {
        Some((cut, _)) => format!("{}{}", &trimmed[..cut], TRUNCATION_MARKER),
        None => trimmed.to_string(),
    }
}

/// Remove `<...>` tags. An unterminated tag swallows the rest of the input.
pub fn strip_tags(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match (in_tag, c) {
            (false, '<') => in_tag = true,
            (true, '>') => in_tag = false,
            (false, c) => out.push(c),
            (true, _) => {}
        }
    }
    out
}
