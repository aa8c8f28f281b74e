//! Role prompt rendering.
//!
//! Each role's template (`.gateloop/roles/<role>.md`) is rendered with
//! minijinja, then followed by a built-in references block that points the
//! role at the spec, plan, notes, sibling reports and every gate artifact.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::io::config::LoopConfig;
use crate::io::iteration_log::LoopPaths;

const REFERENCES_TEMPLATE: &str = include_str!("prompts/references.md");

#[derive(Debug, Clone, Serialize)]
struct ReportRef {
    role: String,
    path: String,
}

/// Everything a role prompt is rendered from.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub root: &'a Path,
    pub loop_cfg: &'a LoopConfig,
    pub paths: &'a LoopPaths,
    pub role: &'a str,
    pub iteration: u32,
    pub template_path: PathBuf,
}

/// Render the full prompt for one role.
pub fn render_role_prompt(input: &PromptInputs<'_>) -> Result<String> {
    let template = fs::read_to_string(&input.template_path)
        .with_context(|| format!("read role template {}", input.template_path.display()))?;

    let mut env = Environment::new();
    env.add_template("role", &template)
        .with_context(|| format!("parse role template {}", input.template_path.display()))?;
    env.add_template("references", REFERENCES_TEMPLATE)
        .context("parse references template")?;

    let rel = |path: &Path| display_rel(input.root, path);
    let reports: Vec<ReportRef> = input
        .loop_cfg
        .roles
        .iter()
        .filter(|r| r.as_str() != input.role)
        .map(|r| ReportRef {
            role: r.clone(),
            path: rel(&input.paths.report_path(r)),
        })
        .collect();
    let report = rel(&input.paths.report_path(input.role));

    let role_text = env
        .get_template("role")?
        .render(context! {
            role => input.role,
            loop_id => input.loop_cfg.id,
            iteration => input.iteration,
            report => report,
            promise => input.loop_cfg.completion_promise,
            spec => input.loop_cfg.spec_file,
        })
        .with_context(|| format!("render role template {}", input.template_path.display()))?;

    let references = env
        .get_template("references")?
        .render(context! {
            spec => input.loop_cfg.spec_file,
            plan => rel(&input.paths.plan_path),
            notes => rel(&input.paths.notes_path),
            report => report,
            reports => reports,
            gate_summary => rel(&input.paths.gate_summary_path),
            checklist_status => rel(&input.paths.checklist_status_path),
            checklist_remaining => rel(&input.paths.checklist_remaining_path),
            checklist_missing => rel(&input.paths.checklist_missing_path),
            test_status => rel(&input.paths.test_status_path),
            test_output => rel(&input.paths.test_output_path),
            evidence => rel(&input.paths.evidence_path),
            checklists => input.loop_cfg.checklists,
        })
        .context("render references")?;

    let prompt = format!("{}\n\n{}\n", role_text.trim_end(), references.trim());
    debug!(role = input.role, bytes = prompt.len(), "rendered role prompt");
    Ok(prompt)
}

fn display_rel(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loop_cfg() -> LoopConfig {
        LoopConfig {
            id: "main".to_string(),
            roles: vec!["planner".to_string(), "reviewer".to_string()],
            checklists: vec!["PLAN.md".to_string()],
            completion_promise: "SHIP IT".to_string(),
            ..LoopConfig::default()
        }
    }

    #[test]
    fn renders_template_variables_and_references() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let template_path = root.join("reviewer.md");
        fs::write(
            &template_path,
            "I am {{ role }} in {{ loop_id }} #{{ iteration }}.\n<promise>{{ promise }}</promise>\n",
        )
        .expect("write");
        let cfg = loop_cfg();
        let paths = LoopPaths::new(root, "main");

        let prompt = render_role_prompt(&PromptInputs {
            root,
            loop_cfg: &cfg,
            paths: &paths,
            role: "reviewer",
            iteration: 3,
            template_path,
        })
        .expect("render");

        assert!(prompt.starts_with("I am reviewer in main #3.\n<promise>SHIP IT</promise>"));
        assert!(prompt.contains("- Specification: `SPEC.md`"));
        assert!(prompt.contains("- Your report: `.gateloop/loops/main/reports/reviewer.md`"));
        assert!(prompt.contains("- planner: `.gateloop/loops/main/reports/planner.md`"));
        assert!(!prompt.contains("- reviewer: `"));
        assert!(prompt.contains("- Gate summary: `.gateloop/loops/main/gate-summary.txt`"));
        assert!(prompt.contains("- `PLAN.md`"));
        assert!(prompt.trim_end().ends_with("</references>"));
    }

    #[test]
    fn missing_template_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = loop_cfg();
        let paths = LoopPaths::new(temp.path(), "main");
        let err = render_role_prompt(&PromptInputs {
            root: temp.path(),
            loop_cfg: &cfg,
            paths: &paths,
            role: "planner",
            iteration: 1,
            template_path: temp.path().join("absent.md"),
        })
        .unwrap_err();
        assert!(err.to_string().contains("read role template"));
    }
}
