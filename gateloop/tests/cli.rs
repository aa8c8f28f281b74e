//! CLI tests for the `gateloop` binary.
//!
//! Spawns the binary against temp workspaces and checks exit codes and the
//! artifacts each command leaves behind.

use std::path::Path;
use std::process::{Command, Output};

use gateloop::exit_codes;
use gateloop::io::config::{GateloopConfig, load_config, write_config};
use gateloop::io::init::{GateloopPaths, InitOptions, init_workspace};
use gateloop::io::iteration_log::LoopPaths;
use gateloop::io::run_state::{RunState, StateStore};

fn gateloop(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gateloop"))
        .arg("-C")
        .arg(root)
        .args(args)
        .output()
        .expect("spawn gateloop")
}

fn init_with(root: &Path, edit: impl FnOnce(&mut GateloopConfig)) {
    let paths = init_workspace(root, &InitOptions { force: false }).expect("init");
    let mut cfg = load_config(&paths.config_path).expect("load config");
    edit(&mut cfg);
    write_config(&paths.config_path, &cfg).expect("write config");
}

fn shell_runner(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

#[test]
fn init_then_validate_succeeds() {
    let temp = tempfile::tempdir().expect("tempdir");

    let init = gateloop(temp.path(), &["init"]);
    assert_eq!(init.status.code(), Some(exit_codes::OK));
    let validate = gateloop(temp.path(), &["validate"]);
    assert_eq!(validate.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&validate.stdout).contains("loop main: ok"));

    let again = gateloop(temp.path(), &["init"]);
    assert_eq!(again.status.code(), Some(exit_codes::FAILURE));
    assert!(String::from_utf8_lossy(&again.stderr).contains("--force"));
}

#[test]
fn run_without_config_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = gateloop(temp.path(), &["run"]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
    assert!(String::from_utf8_lossy(&output.stderr).contains("gateloop init"));
}

#[test]
fn run_completes_when_roles_emit_promise() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_with(temp.path(), |cfg| {
        cfg.runner.command = shell_runner("cat >/dev/null; echo '<promise>COMPLETE</promise>'");
    });

    let output = gateloop(temp.path(), &["run"]);
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[main #1] promise=true"));
    assert!(stdout.contains("complete: main"));

    let paths = LoopPaths::new(temp.path(), "main");
    for role in ["planner", "implementer", "tester", "reviewer"] {
        assert!(paths.prompt_path(role).is_file(), "{role} prompt");
        assert!(paths.raw_output_path(1, role).is_file(), "{role} output");
    }
}

#[test]
fn fast_mode_appends_fast_args() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_with(temp.path(), |cfg| {
        cfg.runner.command = shell_runner(
            "cat >/dev/null; if [ \"$0\" = fast ]; then echo '<promise>COMPLETE</promise>'; fi",
        );
        cfg.runner.fast_args = vec!["fast".to_string()];
        cfg.loops[0].max_iterations = 1;
    });

    let slow = gateloop(temp.path(), &["run"]);
    assert_eq!(slow.status.code(), Some(exit_codes::FAILURE));
    let fast = gateloop(temp.path(), &["run", "--fast"]);
    assert_eq!(fast.status.code(), Some(exit_codes::OK));
}

#[test]
fn exhausted_run_exits_with_failure_and_deactivates() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_with(temp.path(), |cfg| {
        cfg.runner.command = shell_runner("cat >/dev/null; echo working");
        cfg.loops[0].max_iterations = 1;
    });

    let output = gateloop(temp.path(), &["run"]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
    assert!(String::from_utf8_lossy(&output.stderr).contains("exhausted"));

    let state = StateStore::new(GateloopPaths::new(temp.path()).state_path)
        .load()
        .expect("load")
        .expect("state");
    assert!(!state.active);
}

#[test]
fn failing_role_exits_with_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_with(temp.path(), |cfg| {
        cfg.runner.command = shell_runner("cat >/dev/null; exit 7");
    });

    let output = gateloop(temp.path(), &["run"]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
    assert!(String::from_utf8_lossy(&output.stderr).contains("exited with status 7"));
}

#[test]
fn dry_run_prints_summary_and_leaves_state_untouched() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_with(temp.path(), |_| {});

    let output = gateloop(temp.path(), &["run", "--dry-run", "--loop", "main"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "[main] promise=false tests=skipped checklist=ok evidence=skipped stuck=0/3\n"
    );
    assert!(!GateloopPaths::new(temp.path()).state_path.exists());
    assert!(!LoopPaths::new(temp.path(), "main").dir.exists());
}

#[test]
fn status_cancel_and_approve() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_with(temp.path(), |_| {});
    let store = StateStore::new(GateloopPaths::new(temp.path()).state_path);
    store
        .save(&RunState::active_at(0, "main", 3))
        .expect("save state");

    let status = gateloop(temp.path(), &["status"]);
    assert_eq!(status.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&status.stdout).contains("iteration 3"));

    let cancel = gateloop(temp.path(), &["cancel"]);
    assert_eq!(cancel.status.code(), Some(exit_codes::OK));
    assert!(!store.load().expect("load").expect("state").active);

    let approve = gateloop(temp.path(), &["approve", "--loop", "main", "--note", "lgtm"]);
    assert_eq!(approve.status.code(), Some(exit_codes::OK));
    assert!(LoopPaths::new(temp.path(), "main").approval_path.is_file());

    let unknown = gateloop(temp.path(), &["approve", "--loop", "nope"]);
    assert_eq!(unknown.status.code(), Some(exit_codes::FAILURE));
}
