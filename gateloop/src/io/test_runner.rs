//! Test command runner for the tests gate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::gates::should_run_tests;
use crate::core::types::{TestMode, TestStatus};
use crate::io::files::write_text;
use crate::io::process::{ProcessOptions, run_command, shell_command};
use crate::io::timestamp;

#[derive(Debug, Clone)]
pub struct TestRequest {
    pub workdir: PathBuf,
    pub commands: Vec<String>,
    pub mode: TestMode,
    /// Combined transcript of every command.
    pub transcript_path: PathBuf,
    /// Bound for each command.
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

pub trait TestRunner {
    fn run(&self, request: &TestRequest) -> Result<TestStatus>;
}

/// Runs each command with `sh -c` from the workspace root.
pub struct ShellTestRunner;

impl TestRunner for ShellTestRunner {
    #[instrument(skip_all, fields(commands = request.commands.len()))]
    fn run(&self, request: &TestRequest) -> Result<TestStatus> {
        if request.commands.is_empty() {
            write_text(&request.transcript_path, "[no test commands configured]\n")?;
            return Ok(TestStatus::skipped(
                request.mode,
                &request.commands,
                timestamp::now(),
            ));
        }

        let mut transcript = String::new();
        let mut all_ok = true;
        let mut last_exit = None;

        // Every command runs; a failure never short-circuits the rest.
        for command in &request.commands {
            info!(command = %command, "running test command");
            let output = run_command(
                shell_command(command, &request.workdir),
                ProcessOptions {
                    stdin: None,
                    timeout: request.timeout,
                    output_limit_bytes: request.output_limit_bytes,
                    stream_path: None,
                },
            )?;
            let code = output.exit_code();
            if code != 0 {
                warn!(command = %command, exit_code = code, "test command failed");
                all_ok = false;
            }
            last_exit = Some(code);

            transcript.push_str(&format!("$ {command}\n"));
            transcript.push_str(&output.render_streams("test"));
            if output.timed_out {
                transcript.push_str(&format!("\n[timed out after {:?}]", request.timeout));
            }
            transcript.push_str(&format!("\n[exit {code}]\n\n"));
        }

        write_text(&request.transcript_path, &transcript)?;
        debug!(ok = all_ok, exit_code = ?last_exit, "tests finished");
        Ok(TestStatus {
            ok: all_ok,
            skipped: false,
            exit_code: last_exit,
            mode: request.mode,
            commands: request.commands.clone(),
            generated_at: timestamp::now(),
        })
    }
}

/// Apply the test-mode policy, running tests only when it calls for them.
pub fn run_tests_if_needed<R: TestRunner>(
    runner: &R,
    request: &TestRequest,
    promise_matched: bool,
    checklist_ok: bool,
) -> Result<TestStatus> {
    if !should_run_tests(request.mode, promise_matched, checklist_ok) {
        debug!(mode = request.mode.as_str(), "tests skipped this iteration");
        write_skip_notice(&request.transcript_path, request.mode)?;
        return Ok(TestStatus::skipped(
            request.mode,
            &request.commands,
            timestamp::now(),
        ));
    }
    runner.run(request)
}

fn write_skip_notice(path: &Path, mode: TestMode) -> Result<()> {
    write_text(path, &format!("[tests skipped (mode={})]\n", mode.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn request(temp: &Path, mode: TestMode, commands: &[&str]) -> TestRequest {
        TestRequest {
            workdir: temp.to_path_buf(),
            commands: commands.iter().map(|c| c.to_string()).collect(),
            mode,
            transcript_path: temp.join("out/test-output.txt"),
            timeout: Duration::from_secs(10),
            output_limit_bytes: 10_000,
        }
    }

    struct FakeRunner;

    impl TestRunner for FakeRunner {
        fn run(&self, request: &TestRequest) -> Result<TestStatus> {
            Ok(TestStatus {
                ok: false,
                skipped: false,
                exit_code: Some(1),
                mode: request.mode,
                commands: request.commands.clone(),
                generated_at: "t".to_string(),
            })
        }
    }

    #[test]
    fn runs_every_command_without_short_circuit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let req = request(
            temp.path(),
            TestMode::Every,
            &["exit 2", "touch ran-second", "true"],
        );
        let status = ShellTestRunner.run(&req).expect("run");

        assert!(!status.ok);
        assert!(!status.skipped);
        assert_eq!(status.exit_code, Some(0), "exit_code is the last command's");
        assert!(temp.path().join("ran-second").exists());

        let transcript = fs::read_to_string(&req.transcript_path).expect("transcript");
        assert!(transcript.contains("$ exit 2"));
        assert!(transcript.contains("[exit 2]"));
        assert!(transcript.contains("[exit 0]"));
    }

    #[test]
    fn all_zero_exit_codes_pass() {
        let temp = tempfile::tempdir().expect("tempdir");
        let req = request(temp.path(), TestMode::Every, &["echo one", "echo two"]);
        let status = ShellTestRunner.run(&req).expect("run");
        assert!(status.ok);
        assert_eq!(status.exit_code, Some(0));
    }

    #[test]
    fn zero_commands_skip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let req = request(temp.path(), TestMode::Every, &[]);
        let status = ShellTestRunner.run(&req).expect("run");
        assert!(status.ok);
        assert!(status.skipped);
    }

    #[test]
    fn on_promise_skips_until_promise_or_checklist() {
        let temp = tempfile::tempdir().expect("tempdir");
        let req = request(temp.path(), TestMode::OnPromise, &["false"]);

        let skipped = run_tests_if_needed(&FakeRunner, &req, false, false).expect("skip");
        assert!(skipped.skipped && skipped.ok);

        let ran = run_tests_if_needed(&FakeRunner, &req, false, true).expect("run");
        assert!(!ran.skipped);
        assert!(!ran.ok);
    }
}
