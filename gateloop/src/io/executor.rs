//! Executor abstraction for role invocation.
//!
//! The [`RoleExecutor`] trait decouples the loop controller from the actual
//! agent backend (a configured command such as `codex exec -`). Tests use
//! scripted executors that write predetermined outputs without spawning
//! processes.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::RunnerConfig;
use crate::io::files::write_text;
use crate::io::process::{CommandOutput, ProcessOptions, run_command};

/// Parameters for one role invocation.
#[derive(Debug, Clone)]
pub struct RoleRequest {
    pub role: String,
    pub iteration: u32,
    /// Working directory for the role process (the workspace root).
    pub workdir: PathBuf,
    /// Rendered prompt, fed on stdin.
    pub prompt: String,
    /// Where the role's stdout is written verbatim.
    pub raw_output_path: PathBuf,
    /// Combined stdout/stderr transcript.
    pub transcript_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// What a successful role invocation left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleOutput {
    pub raw_output_path: PathBuf,
    pub transcript_path: PathBuf,
    pub exit_code: i32,
}

/// Abstraction over role execution backends.
pub trait RoleExecutor {
    /// Run one role. Must leave its stdout at `request.raw_output_path`.
    fn execute(&self, request: &RoleRequest) -> Result<RoleOutput>;
}

/// A role process exited nonzero or timed out. Always fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleFailedError {
    pub role: String,
    pub iteration: u32,
    pub exit_code: i32,
    pub timed_out: bool,
    pub transcript_path: PathBuf,
}

impl fmt::Display for RoleFailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timed_out {
            write!(
                f,
                "role {} timed out in iteration {} (see {})",
                self.role,
                self.iteration,
                self.transcript_path.display()
            )
        } else {
            write!(
                f,
                "role {} exited with status {} in iteration {} (see {})",
                self.role,
                self.exit_code,
                self.iteration,
                self.transcript_path.display()
            )
        }
    }
}

impl std::error::Error for RoleFailedError {}

/// Executor that spawns the configured runner command.
#[derive(Debug, Clone)]
pub struct CommandRoleExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandRoleExecutor {
    /// Build from `[runner]`, appending `fast_args` in fast mode.
    pub fn from_config(runner: &RunnerConfig, fast: bool) -> Result<Self> {
        let (program, rest) = runner
            .command
            .split_first()
            .ok_or_else(|| anyhow!("runner.command must not be empty"))?;
        let mut args = rest.to_vec();
        if fast {
            args.extend(runner.fast_args.iter().cloned());
        }
        Ok(Self {
            program: program.clone(),
            args,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl RoleExecutor for CommandRoleExecutor {
    #[instrument(skip_all, fields(role = %request.role, iteration = request.iteration))]
    fn execute(&self, request: &RoleRequest) -> Result<RoleOutput> {
        info!(program = %self.program, "starting role");
        // Stale output from an earlier attempt must never be scanned for the promise.
        write_text(&request.raw_output_path, "")?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(&request.workdir);

        let output = run_command(
            cmd,
            ProcessOptions {
                stdin: Some(request.prompt.as_bytes()),
                timeout: request.timeout,
                output_limit_bytes: request.output_limit_bytes,
                stream_path: Some(&request.raw_output_path),
            },
        )
        .with_context(|| format!("run role {}", request.role))?;

        write_text(&request.transcript_path, &render_transcript(&output))?;

        let exit_code = output.exit_code();
        if output.timed_out || exit_code != 0 {
            warn!(exit_code, timed_out = output.timed_out, "role failed");
            return Err(RoleFailedError {
                role: request.role.clone(),
                iteration: request.iteration,
                exit_code,
                timed_out: output.timed_out,
                transcript_path: request.transcript_path.clone(),
            }
            .into());
        }

        debug!("role completed successfully");
        Ok(RoleOutput {
            raw_output_path: request.raw_output_path.clone(),
            transcript_path: request.transcript_path.clone(),
            exit_code,
        })
    }
}

fn render_transcript(output: &CommandOutput) -> String {
    let mut buf = output.render_streams("role");
    if output.timed_out {
        buf.push_str("\n[role timed out]\n");
    }
    buf.push_str(&format!("\n[exit {}]\n", output.exit_code()));
    buf
}
