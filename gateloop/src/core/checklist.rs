//! Unchecked task marker scanning for checklist documents.

use std::sync::LazyLock;

use regex::Regex;

static UNCHECKED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+\[ \]").expect("unchecked marker regex should be valid")
});

/// An unchecked task item found outside fenced code blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemainingItem {
    /// 1-indexed line number.
    pub line: usize,
    pub text: String,
}

/// Return unchecked task items that are not inside a fenced code block.
///
/// A line whose trimmed start is a ```` ``` ```` or `~~~` fence toggles the
/// fence state; only the fence kind that opened a block can close it.
pub fn scan_unchecked(contents: &str) -> Vec<RemainingItem> {
    let mut items = Vec::new();
    let mut open_fence: Option<&'static str> = None;

    for (idx, line) in contents.lines().enumerate() {
        if let Some(fence) = fence_marker(line) {
            match open_fence {
                None => open_fence = Some(fence),
                Some(open) if open == fence => open_fence = None,
                Some(_) => {}
            }
            continue;
        }
        if open_fence.is_some() {
            continue;
        }
        if UNCHECKED_RE.is_match(line) {
            items.push(RemainingItem {
                line: idx + 1,
                text: line.trim().to_string(),
            });
        }
    }

    items
}

fn fence_marker(line: &str) -> Option<&'static str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}
