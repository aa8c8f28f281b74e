//! Test-only helpers: a scaffolded temp workspace and a scripted role executor.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::io::config::{GateloopConfig, LoopConfig, RunnerConfig, write_config};
use crate::io::executor::{RoleExecutor, RoleFailedError, RoleOutput, RoleRequest};
use crate::io::files::write_text;
use crate::io::init::GateloopPaths;

const ROLE_TEMPLATE: &str = "Role {{ role }} for {{ loop_id }} iteration {{ iteration }}.\n";
const FINAL_TEMPLATE: &str =
    "Role {{ role }} for {{ loop_id }} iteration {{ iteration }}.\nEmit <promise>{{ promise }}</promise> when done.\n";

/// A temp workspace with `SPEC.md`, role templates and a one-loop config.
///
/// The default loop is `main` with roles `planner` then `reviewer`.
pub struct TestWorkspace {
    temp: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let ws = Self { temp };
        ws.write("SPEC.md", "# Spec\n\nBuild the thing.\n")?;
        let paths = ws.paths();
        write_text(&paths.role_template_path("planner"), ROLE_TEMPLATE)?;
        write_text(&paths.role_template_path("reviewer"), FINAL_TEMPLATE)?;
        ws.write_config(&ws.config())?;
        Ok(ws)
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn paths(&self) -> GateloopPaths {
        GateloopPaths::new(self.root())
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        write_text(&self.path(rel), contents)
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            id: "main".to_string(),
            roles: vec!["planner".to_string(), "reviewer".to_string()],
            ..LoopConfig::default()
        }
    }

    /// Config with a runner command that cannot succeed if ever spawned.
    pub fn config(&self) -> GateloopConfig {
        GateloopConfig {
            runner: RunnerConfig {
                command: vec!["false".to_string()],
                ..RunnerConfig::default()
            },
            loops: vec![self.loop_config()],
        }
    }

    pub fn write_config(&self, cfg: &GateloopConfig) -> Result<()> {
        write_config(&self.paths().config_path, cfg)
    }
}

/// One scripted role invocation.
#[derive(Debug, Clone)]
pub struct ScriptedRole {
    output: String,
    stderr: String,
    exit_code: i32,
    files: Vec<(String, String)>,
}

impl ScriptedRole {
    /// Succeed, writing `output` as the role's stdout.
    pub fn output(output: &str) -> Self {
        Self {
            output: output.to_string(),
            stderr: String::new(),
            exit_code: 0,
            files: Vec::new(),
        }
    }

    /// Fail with the given exit code.
    pub fn failure(exit_code: i32) -> Self {
        Self {
            output: String::new(),
            stderr: String::new(),
            exit_code,
            files: Vec::new(),
        }
    }

    /// Also print `stderr`; it lands in the transcript only.
    pub fn stderr(mut self, stderr: &str) -> Self {
        self.stderr = stderr.to_string();
        self
    }

    /// Also write a workspace file (relative path) while "running".
    pub fn write_file(mut self, rel: &str, contents: &str) -> Self {
        self.files.push((rel.to_string(), contents.to_string()));
        self
    }
}

/// Executor that replays scripted roles in order and records each call.
///
/// Running out of script is an error so tests notice unexpected calls.
pub struct ScriptedRoleExecutor {
    script: RefCell<VecDeque<ScriptedRole>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedRoleExecutor {
    pub fn new(script: Vec<ScriptedRole>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Roles invoked so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.borrow().len()
    }
}

impl RoleExecutor for ScriptedRoleExecutor {
    fn execute(&self, request: &RoleRequest) -> Result<RoleOutput> {
        self.calls.borrow_mut().push(request.role.clone());
        let step = self.script.borrow_mut().pop_front().ok_or_else(|| {
            anyhow!(
                "scripted executor exhausted at role {} (iteration {})",
                request.role,
                request.iteration
            )
        })?;

        for (rel, contents) in &step.files {
            write_text(&request.workdir.join(rel), contents)?;
        }
        write_text(&request.raw_output_path, &step.output)?;
        write_text(
            &request.transcript_path,
            &format!(
                "=== stdout ===\n{}\n=== stderr ===\n{}\n[exit {}]\n",
                step.output, step.stderr, step.exit_code
            ),
        )?;

        if step.exit_code != 0 {
            return Err(RoleFailedError {
                role: request.role.clone(),
                iteration: request.iteration,
                exit_code: step.exit_code,
                timed_out: false,
                transcript_path: request.transcript_path.clone(),
            }
            .into());
        }
        Ok(RoleOutput {
            raw_output_path: request.raw_output_path.clone(),
            transcript_path: request.transcript_path.clone(),
            exit_code: 0,
        })
    }
}
