//! Pattern resolution for checklist and evidence obligations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use glob::{MatchOptions, Pattern};

/// A concrete path produced from a declared pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Workspace-relative form used in listings and manifests.
    pub rel: String,
    pub abs: PathBuf,
}

pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Expand `pattern` relative to `root`.
///
/// Non-glob patterns pass through unchanged whether or not they exist. Globs
/// expand to matching files in sorted order; an empty result means the
/// pattern matched nothing.
pub fn resolve_pattern(root: &Path, pattern: &str) -> Result<Vec<ResolvedPath>> {
    if !is_glob(pattern) {
        let abs = root.join(pattern);
        return Ok(vec![ResolvedPath {
            rel: relative_display(root, &abs),
            abs,
        }]);
    }

    let root_str = root
        .to_str()
        .ok_or_else(|| anyhow!("workspace path is not valid UTF-8: {}", root.display()))?;
    let full = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        format!("{}/{}", Pattern::escape(root_str), pattern)
    };
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let mut matches = Vec::new();
    for entry in glob::glob_with(&full, options).with_context(|| format!("glob {pattern}"))? {
        let abs = entry.with_context(|| format!("glob {pattern}"))?;
        if abs.is_file() {
            matches.push(ResolvedPath {
                rel: relative_display(root, &abs),
                abs,
            });
        }
    }
    matches.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(matches)
}

fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
