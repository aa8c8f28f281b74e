//! Checklist validation: resolve patterns, count unresolved task markers.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::checklist::scan_unchecked;
use crate::core::types::ChecklistStatus;
use crate::io::files::{read_text_lossy_opt, write_json, write_text};
use crate::io::resolve::resolve_pattern;
use crate::io::timestamp;

/// Full checklist evaluation including the listings behind the counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistReport {
    pub status: ChecklistStatus,
    /// `path:line: text` for each unchecked item.
    pub remaining_items: Vec<String>,
    /// Missing files, or patterns that matched nothing.
    pub missing_files: Vec<String>,
}

/// Evaluate checklists without writing anything.
///
/// Each missing file (or pattern matching zero files) counts as one remaining
/// obligation. Zero patterns is vacuously ok.
#[instrument(skip_all, fields(patterns = patterns.len()))]
pub fn evaluate_checklists(root: &Path, patterns: &[String]) -> Result<ChecklistReport> {
    let mut remaining_items = Vec::new();
    let mut missing_files = Vec::new();

    for pattern in patterns {
        let resolved = resolve_pattern(root, pattern)?;
        if resolved.is_empty() {
            debug!(pattern = %pattern, "checklist pattern matched nothing");
            missing_files.push(pattern.clone());
            continue;
        }
        for file in resolved {
            if !file.abs.is_file() {
                missing_files.push(file.rel);
                continue;
            }
            let contents = read_text_lossy_opt(&file.abs)
                .with_context(|| format!("read checklist {}", file.abs.display()))?
                .unwrap_or_default();
            for item in scan_unchecked(&contents) {
                remaining_items.push(format!("{}:{}: {}", file.rel, item.line, item.text));
            }
        }
    }

    let remaining = remaining_items.len() + missing_files.len();
    debug!(remaining, missing = missing_files.len(), "checklists evaluated");
    Ok(ChecklistReport {
        status: ChecklistStatus {
            ok: remaining == 0,
            remaining,
            missing: missing_files.len(),
            generated_at: timestamp::now(),
        },
        remaining_items,
        missing_files,
    })
}

/// Output locations for `check_checklists`.
#[derive(Debug, Clone)]
pub struct ChecklistArtifacts<'a> {
    pub status_path: &'a Path,
    pub remaining_path: &'a Path,
    pub missing_path: &'a Path,
}

/// Evaluate checklists and write the status record plus both listings.
pub fn check_checklists(
    root: &Path,
    patterns: &[String],
    artifacts: &ChecklistArtifacts<'_>,
) -> Result<ChecklistStatus> {
    let report = evaluate_checklists(root, patterns)?;
    write_text(artifacts.remaining_path, &render_listing(&report.remaining_items))?;
    write_text(artifacts.missing_path, &render_listing(&report.missing_files))?;
    write_json(artifacts.status_path, &report.status)?;
    Ok(report.status)
}

fn render_listing(lines: &[String]) -> String {
    let mut buf = String::new();
    for line in lines {
        buf.push_str(line);
        buf.push('\n');
    }
    buf
}
