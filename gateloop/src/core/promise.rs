//! Completion token extraction from the final role's output.
//!
//! The final role asserts completion by emitting `<promise>TOKEN</promise>`.
//! Only the first tag counts; its body is whitespace-normalized and compared
//! case-sensitively against the configured token.

use std::sync::LazyLock;

use regex::Regex;

static PROMISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<promise>(.*?)</promise>").expect("promise regex should be valid")
});

/// Return the normalized body of the first `<promise>` tag, if any.
pub fn extract_promise(output: &str) -> Option<String> {
    let caps = PROMISE_RE.captures(output)?;
    caps.get(1).map(|m| normalize_whitespace(m.as_str()))
}

/// True if the first promise tag in `output` equals `expected` after normalization.
pub fn promise_matches(output: &str, expected: &str) -> bool {
    match extract_promise(output) {
        Some(found) => found == normalize_whitespace(expected),
        None => false,
    }
}

/// Collapse internal whitespace runs to one space and trim both ends.
pub fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
