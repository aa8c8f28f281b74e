//! Configuration stored under `.gateloop/config.toml`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::TestMode;
use crate::io::files::write_atomic;
use crate::io::resolve::is_glob;

/// Top-level configuration (TOML).
///
/// This file is edited by humans. Every optional field has an explicit
/// default so use sites never re-check for absence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct GateloopConfig {
    pub runner: RunnerConfig,
    pub loops: Vec<LoopConfig>,
}

/// How roles are executed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Command spawned once per role; the rendered prompt is fed on stdin.
    pub command: Vec<String>,
    /// Extra arguments appended in `--fast` mode.
    pub fast_args: Vec<String>,
    /// Per-role wall-clock bound in seconds.
    pub timeout_secs: u64,
    /// Truncate role stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
            fast_args: Vec::new(),
            timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

/// One iterate-until-gated-complete loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopConfig {
    pub id: String,
    /// Specification document, relative to the workspace root.
    pub spec_file: String,
    /// 0 means unbounded.
    pub max_iterations: u32,
    /// Exact token the final role must emit inside `<promise>` tags.
    pub completion_promise: String,
    /// Roles in dispatch order; the last one emits the promise.
    pub roles: Vec<String>,
    /// Checklist glob patterns, relative to the workspace root.
    pub checklists: Vec<String>,
    pub tests: TestsConfig,
    pub evidence: EvidenceConfig,
    pub stuck: StuckConfig,
    pub approval: ApprovalConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            spec_file: "SPEC.md".to_string(),
            max_iterations: 20,
            completion_promise: "COMPLETE".to_string(),
            roles: ["planner", "implementer", "tester", "reviewer"]
                .iter()
                .map(|r| r.to_string())
                .collect(),
            checklists: Vec::new(),
            tests: TestsConfig::default(),
            evidence: EvidenceConfig::default(),
            stuck: StuckConfig::default(),
            approval: ApprovalConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestsConfig {
    pub mode: TestMode,
    /// Shell commands, each run with `sh -c` from the workspace root.
    pub commands: Vec<String>,
    /// Per-command wall-clock bound in seconds.
    pub timeout_secs: u64,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            mode: TestMode::Disabled,
            commands: Vec::new(),
            timeout_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct EvidenceConfig {
    pub enabled: bool,
    pub require_on_completion: bool,
    /// Named artifact patterns recorded (with hashes) in the manifest.
    pub artifacts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StuckConfig {
    pub enabled: bool,
    pub threshold: u32,
    /// Glob patterns (workspace-relative) excluded from the content signature.
    pub ignore: Vec<String>,
}

impl Default for StuckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 3,
            ignore: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ApprovalConfig {
    pub enabled: bool,
}

impl GateloopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.runner.command.is_empty() || self.runner.command[0].trim().is_empty() {
            return Err(anyhow!("runner.command must be a non-empty array"));
        }
        if self.runner.timeout_secs == 0 {
            return Err(anyhow!("runner.timeout_secs must be > 0"));
        }
        if self.runner.output_limit_bytes == 0 {
            return Err(anyhow!("runner.output_limit_bytes must be > 0"));
        }
        if self.loops.is_empty() {
            return Err(anyhow!("at least one [[loops]] entry is required"));
        }
        let mut seen = HashSet::new();
        for lp in &self.loops {
            lp.validate()?;
            if !seen.insert(lp.id.as_str()) {
                return Err(anyhow!("duplicate loop id '{}'", lp.id));
            }
        }
        Ok(())
    }

    pub fn find_loop(&self, id: &str) -> Option<(usize, &LoopConfig)> {
        self.loops.iter().enumerate().find(|(_, lp)| lp.id == id)
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if !is_safe_name(&self.id) {
            return Err(anyhow!(
                "loop id '{}' must be non-empty and use only [A-Za-z0-9_-]",
                self.id
            ));
        }
        if self.spec_file.trim().is_empty() {
            return Err(anyhow!("loop '{}': spec_file must be set", self.id));
        }
        if self.completion_promise.trim().is_empty() {
            return Err(anyhow!(
                "loop '{}': completion_promise must be non-empty",
                self.id
            ));
        }
        if self.roles.is_empty() {
            return Err(anyhow!("loop '{}': roles must be non-empty", self.id));
        }
        for role in &self.roles {
            if !is_safe_name(role) {
                return Err(anyhow!(
                    "loop '{}': role '{}' must use only [A-Za-z0-9_-]",
                    self.id,
                    role
                ));
            }
        }
        if self.stuck.enabled && self.stuck.threshold == 0 {
            return Err(anyhow!("loop '{}': stuck.threshold must be > 0", self.id));
        }
        if self.tests.timeout_secs == 0 {
            return Err(anyhow!("loop '{}': tests.timeout_secs must be > 0", self.id));
        }
        let globs = self
            .checklists
            .iter()
            .map(|p| ("checklists", p))
            .chain(self.evidence.artifacts.iter().map(|p| ("evidence.artifacts", p)))
            .filter(|(_, p)| is_glob(p))
            .chain(self.stuck.ignore.iter().map(|p| ("stuck.ignore", p)));
        for (field, pattern) in globs {
            Pattern::new(pattern).map_err(|err| {
                anyhow!("loop '{}': invalid {field} pattern {pattern:?}: {err}", self.id)
            })?;
        }
        Ok(())
    }

    /// The role whose output carries the completion promise.
    pub fn final_role(&self) -> &str {
        self.roles.last().map(String::as_str).unwrap_or_default()
    }
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Load and validate config from a TOML file.
pub fn load_config(path: &Path) -> Result<GateloopConfig> {
    debug!(path = %path.display(), "loading config");
    if !path.exists() {
        return Err(anyhow!(
            "missing config {} (run `gateloop init`)",
            path.display()
        ));
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: GateloopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Write config through a temp file and rename.
pub fn write_config(path: &Path, cfg: &GateloopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
