//! Git adapter used to enumerate version-controlled files.
//!
//! Content signatures only need the file list, so this wrapper stays small
//! and explicit around `git` subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// True if `workdir` is the top level of a git work tree.
    ///
    /// A workspace nested inside some other repository is treated as
    /// unversioned so its signature never depends on files outside it.
    pub fn is_repository_root(&self) -> bool {
        let Ok(output) = self.run(&["rev-parse", "--show-toplevel"]) else {
            return false;
        };
        if !output.status.success() {
            return false;
        }
        let toplevel = String::from_utf8_lossy(&output.stdout).trim().to_string();
        match (
            Path::new(&toplevel).canonicalize(),
            self.workdir.canonicalize(),
        ) {
            (Ok(top), Ok(dir)) => top == dir,
            _ => false,
        }
    }

    /// Tracked files plus untracked, non-ignored files (paths relative to workdir).
    ///
    /// Tracked files deleted from the work tree are still listed.
    #[instrument(skip_all)]
    pub fn tracked_files(&self) -> Result<Vec<String>> {
        let output = self.run_checked(&[
            "ls-files",
            "-z",
            "--cached",
            "--others",
            "--exclude-standard",
        ])?;
        let files = parse_nul_separated(&output.stdout);
        debug!(count = files.len(), "listed tracked files");
        Ok(files)
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// Split `-z` output, dropping duplicates (`--cached` and `--others` can overlap).
fn parse_nul_separated(stdout: &[u8]) -> Vec<String> {
    let mut files: Vec<String> = stdout
        .split(|b| *b == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| String::from_utf8_lossy(chunk).to_string())
        .collect();
    files.sort();
    files.dedup();
    files
}
