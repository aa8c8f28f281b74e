//! Validation of the `.gateloop/` layout and every configured loop's inputs.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::io::config::load_config;
use crate::io::init::GateloopPaths;
use crate::io::run_state::StateStore;

/// Per-loop validation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopValidation {
    pub loop_id: String,
    pub roles: usize,
    pub checklists: usize,
}

/// High-level validation outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateOutcome {
    pub loops: Vec<LoopValidation>,
}

/// Validate config, spec files, role templates and any persisted run state.
///
/// All missing inputs are reported together rather than one at a time.
pub fn validate_workspace(root: &Path) -> Result<ValidateOutcome> {
    let paths = GateloopPaths::new(root);
    ensure_dir(&paths.dir)?;
    ensure_dir(&paths.roles_dir)?;
    let cfg = load_config(&paths.config_path).with_context(|| "load config.toml")?;

    let mut problems = Vec::new();
    let mut loops = Vec::new();
    for lp in &cfg.loops {
        let spec = root.join(&lp.spec_file);
        if !spec.is_file() {
            problems.push(format!("loop {}: missing spec file {}", lp.id, spec.display()));
        }
        for role in &lp.roles {
            let template = paths.role_template_path(role);
            if !template.is_file() {
                problems.push(format!(
                    "loop {}: missing role template {}",
                    lp.id,
                    template.display()
                ));
            }
        }
        loops.push(LoopValidation {
            loop_id: lp.id.clone(),
            roles: lp.roles.len(),
            checklists: lp.checklists.len(),
        });
    }

    if let Some(state) = StateStore::new(&paths.state_path)
        .load()
        .with_context(|| "load state.json")?
        && let Some(loop_id) = state.current_loop_id.as_deref()
        && cfg.find_loop(loop_id).is_none()
    {
        problems.push(format!("state.json points at unknown loop '{loop_id}'"));
    }

    if !problems.is_empty() {
        return Err(anyhow!("invalid workspace:\n- {}", problems.join("\n- ")));
    }
    debug!(loops = loops.len(), "workspace valid");
    Ok(ValidateOutcome { loops })
}

fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!(
            "missing directory {} (run `gateloop init`)",
            path.display()
        ));
    }
    if !path.is_dir() {
        return Err(anyhow!("expected directory {}", path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::init::{InitOptions, init_workspace};
    use crate::io::run_state::RunState;
    use std::fs;

    #[test]
    fn validate_ok_after_init() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_workspace(temp.path(), &InitOptions { force: false }).expect("init");

        let outcome = validate_workspace(temp.path()).expect("validate");
        assert_eq!(
            outcome.loops,
            vec![LoopValidation {
                loop_id: "main".to_string(),
                roles: 4,
                checklists: 0,
            }]
        );
    }

    #[test]
    fn validate_reports_every_missing_input() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_workspace(temp.path(), &InitOptions { force: false }).expect("init");
        fs::remove_file(temp.path().join("SPEC.md")).expect("remove spec");
        fs::remove_file(paths.role_template_path("tester")).expect("remove template");

        let err = validate_workspace(temp.path()).expect_err("validate should fail");
        let message = err.to_string();
        assert!(message.contains("missing spec file"));
        assert!(message.contains("missing role template"));
        assert!(message.contains("tester.md"));
    }

    #[test]
    fn validate_errors_on_stale_state_pointer() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_workspace(temp.path(), &InitOptions { force: false }).expect("init");
        StateStore::new(&paths.state_path)
            .save(&RunState::active_at(3, "removed", 2))
            .expect("save");

        let err = validate_workspace(temp.path()).expect_err("validate should fail");
        assert!(err.to_string().contains("unknown loop 'removed'"));
    }

    #[test]
    fn validate_errors_on_missing_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = validate_workspace(temp.path()).expect_err("validate should fail");
        assert!(err.to_string().contains("missing directory"));
    }
}
