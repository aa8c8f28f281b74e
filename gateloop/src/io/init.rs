//! Workspace paths and `.gateloop/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use super::config::{GateloopConfig, LoopConfig, RunnerConfig, write_config};
use super::files::write_text;

/// Canonical workspace-level paths within `.gateloop/`.
#[derive(Debug, Clone)]
pub struct GateloopPaths {
    pub root: PathBuf,
    pub dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub state_path: PathBuf,
    pub roles_dir: PathBuf,
    pub loops_dir: PathBuf,
}

impl GateloopPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let dir = root.join(".gateloop");
        Self {
            root: root.clone(),
            dir: dir.clone(),
            gitignore_path: dir.join(".gitignore"),
            config_path: dir.join("config.toml"),
            state_path: dir.join("state.json"),
            roles_dir: dir.join("roles"),
            loops_dir: dir.join("loops"),
        }
    }

    pub fn role_template_path(&self, role: &str) -> PathBuf {
        self.roles_dir.join(format!("{role}.md"))
    }
}

/// Options for `init_workspace`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing gateloop-owned files.
    pub force: bool,
}

/// Create `.gateloop/` scaffolding in `root`.
///
/// Fails if `.gateloop/config.toml` already exists unless `options.force` is
/// set. The spec document is only created when absent, even with `force`.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<GateloopPaths> {
    let paths = GateloopPaths::new(root);
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "gateloop init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }
    if paths.dir.exists() && !paths.dir.is_dir() {
        return Err(anyhow!(
            "gateloop init: .gateloop exists but is not a directory"
        ));
    }

    for dir in [&paths.roles_dir, &paths.loops_dir] {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }

    let config = default_config();
    write_config(&paths.config_path, &config)?;
    write_text(&paths.gitignore_path, GATELOOP_GITIGNORE)?;

    let main = &config.loops[0];
    for role in &main.roles {
        let template = if role.as_str() == main.final_role() {
            FINAL_ROLE_TEMPLATE
        } else {
            ROLE_TEMPLATE
        };
        write_text(&paths.role_template_path(role), template)?;
    }

    let spec_path = root.join(&main.spec_file);
    if !spec_path.exists() {
        debug!(path = %spec_path.display(), "writing spec placeholder");
        write_text(&spec_path, SPEC_PLACEHOLDER)?;
    }

    info!(root = %root.display(), "workspace initialized");
    Ok(paths)
}

fn default_config() -> GateloopConfig {
    GateloopConfig {
        runner: RunnerConfig::default(),
        loops: vec![LoopConfig {
            id: "main".to_string(),
            ..LoopConfig::default()
        }],
    }
}

const ROLE_TEMPLATE: &str = "\
# Role: {{ role }}

You are the {{ role }} for loop `{{ loop_id }}`, iteration {{ iteration }}.

Read the specification and every artifact referenced below. Do your part of
the work in the workspace, then record what you did and what remains in your
report at `{{ report }}`.
";

const FINAL_ROLE_TEMPLATE: &str = "\
# Role: {{ role }}

You are the {{ role }} for loop `{{ loop_id }}`, iteration {{ iteration }}.

Review the workspace against the specification and the gate artifacts
referenced below. Record findings in `{{ report }}`.

Only when every requirement is met, end your reply with:

<promise>{{ promise }}</promise>
";

const SPEC_PLACEHOLDER: &str = "# Specification\n\nDescribe what the loop must build here.\n";
const GATELOOP_GITIGNORE: &str = "state.json\nloops/*/logs/\nloops/*/prompts/\n";
