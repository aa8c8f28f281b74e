//! Workspace content signatures for no-progress detection.
//!
//! Git work trees are enumerated with `git ls-files`, so ignored files never
//! count as progress. Anything else falls back to a full directory walk.

use std::path::Path;

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::io::git::Git;
use crate::io::hashing::{file_sha256, sha256_hex};

/// Directories never part of a signature.
const ALWAYS_EXCLUDED: &[&str] = &[".gateloop", ".git"];

/// Hash of every candidate file's content, keyed by relative path.
///
/// Each file contributes a `path:sha256` line (or `path:missing` for a tracked
/// file that no longer exists). Lines are sorted before hashing so the result
/// does not depend on enumeration order.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn content_signature(root: &Path, ignore: &[String]) -> Result<String> {
    let ignore = compile_ignore(ignore)?;
    let git = Git::new(root);
    let candidates = if git.is_repository_root() {
        git.tracked_files()?
    } else {
        walk_files(root)?
    };

    let mut lines = Vec::with_capacity(candidates.len());
    for rel in candidates {
        if is_excluded(&rel, &ignore) {
            continue;
        }
        let abs = root.join(&rel);
        let hash = if abs.is_file() {
            file_sha256(&abs)?
        } else {
            None
        };
        match hash {
            Some(hash) => lines.push(format!("{rel}:{hash}")),
            None => lines.push(format!("{rel}:missing")),
        }
    }
    lines.sort();
    debug!(files = lines.len(), "computed content signature");
    Ok(sha256_hex(lines.join("\n").as_bytes()))
}

fn compile_ignore(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| Pattern::new(p).with_context(|| format!("invalid stuck ignore pattern {p:?}")))
        .collect()
}

/// True if `rel` or any of its parent directories is excluded.
fn is_excluded(rel: &str, ignore: &[Pattern]) -> bool {
    let options = MatchOptions {
        require_literal_separator: true,
        ..MatchOptions::new()
    };
    let mut prefix = String::new();
    for (idx, component) in rel.split('/').enumerate() {
        if idx == 0 && ALWAYS_EXCLUDED.contains(&component) {
            return true;
        }
        if idx > 0 {
            prefix.push('/');
        }
        prefix.push_str(component);
        if ignore.iter().any(|p| p.matches_with(&prefix, options)) {
            return true;
        }
    }
    false
}

fn walk_files(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() != 1
            || !ALWAYS_EXCLUDED
                .iter()
                .any(|name| entry.file_name() == std::ffi::OsStr::new(name))
    });
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("relativize {}", entry.path().display()))?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(rel);
    }
    Ok(files)
}
