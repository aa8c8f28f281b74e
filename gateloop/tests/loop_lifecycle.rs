//! Loop-level harness tests for full controller lifecycle scenarios.
//!
//! These drive `run_loops` with a scripted role executor and the real shell
//! test runner, then check outcomes, persisted state and loop artifacts.

use std::fs;

use gateloop::core::types::{GateState, TestMode, TestStatus};
use gateloop::io::approval::ApprovalDecision;
use gateloop::io::config::{
    ApprovalConfig, EvidenceConfig, GateloopConfig, LoopConfig, StuckConfig, TestsConfig,
};
use gateloop::io::evidence::EvidenceManifest;
use gateloop::io::iteration_log::{LoopPaths, load_iteration};
use gateloop::io::run_state::{RunState, StateStore};
use gateloop::io::test_runner::ShellTestRunner;
use gateloop::looping::{LoopStop, RunOptions, RunOutcome, run_loops};
use gateloop::test_support::{ScriptedRole, ScriptedRoleExecutor, TestWorkspace};

fn run(
    ws: &TestWorkspace,
    cfg: &GateloopConfig,
    executor: &ScriptedRoleExecutor,
) -> (RunOutcome, Vec<u32>) {
    let mut iterations = Vec::new();
    let outcome = run_loops(
        ws.root(),
        cfg,
        executor,
        &ShellTestRunner,
        &RunOptions::default(),
        |it| iterations.push(it.record.iteration),
    )
    .expect("run loops");
    (outcome, iterations)
}

/// Planner then reviewer for one iteration; the reviewer says `reviewer_output`.
fn iteration(reviewer_output: &str) -> Vec<ScriptedRole> {
    vec![
        ScriptedRole::output("planning"),
        ScriptedRole::output(reviewer_output),
    ]
}

fn state(ws: &TestWorkspace) -> RunState {
    StateStore::new(ws.paths().state_path)
        .load()
        .expect("load state")
        .expect("state exists")
}

fn with_loop(ws: &TestWorkspace, f: impl FnOnce(&mut LoopConfig)) -> GateloopConfig {
    let mut cfg = ws.config();
    f(&mut cfg.loops[0]);
    ws.write_config(&cfg).expect("write config");
    cfg
}

/// Iteration 1 says NOTYET, iteration 2 says DONE: completes at iteration 2.
#[test]
fn notyet_then_done_completes_at_second_iteration() {
    let ws = TestWorkspace::new().expect("workspace");
    let cfg = with_loop(&ws, |lp| {
        lp.max_iterations = 2;
        lp.completion_promise = "DONE".to_string();
    });
    let mut script = iteration("<promise>NOTYET</promise>");
    script.extend(iteration("All good.\n<promise>DONE</promise>\n"));
    let executor = ScriptedRoleExecutor::new(script);

    let (outcome, iterations) = run(&ws, &cfg, &executor);

    assert_eq!(outcome.stop, LoopStop::Complete);
    assert_eq!(iterations, vec![1, 2]);
    assert_eq!(outcome.started_at, Some(("main".to_string(), 1)));
    assert_eq!(executor.remaining(), 0);

    let record = load_iteration(&LoopPaths::new(ws.root(), "main"))
        .expect("load")
        .expect("record");
    assert_eq!(record.iteration, 2);
    assert!(record.complete);
    assert_eq!(record.promise.as_deref(), Some("DONE"));

    let state = state(&ws);
    assert!(!state.active);
    assert_eq!(state.current_loop_id, None);
}

/// A persisted active state resumes at exactly that iteration.
#[test]
fn resume_reenters_persisted_iteration() {
    let ws = TestWorkspace::new().expect("workspace");
    let cfg = ws.config();
    StateStore::new(ws.paths().state_path)
        .save(&RunState::active_at(0, "main", 4))
        .expect("save state");
    let executor = ScriptedRoleExecutor::new(iteration("<promise>COMPLETE</promise>"));

    let (outcome, iterations) = run(&ws, &cfg, &executor);

    assert_eq!(outcome.started_at, Some(("main".to_string(), 4)));
    assert_eq!(iterations, vec![4]);
    assert!(outcome.is_complete());
    assert!(
        LoopPaths::new(ws.root(), "main")
            .raw_output_path(4, "reviewer")
            .is_file()
    );
}

/// A role failure is fatal and leaves state pointing at the failed iteration.
#[test]
fn role_failure_stops_run_and_next_run_resumes_same_iteration() {
    let ws = TestWorkspace::new().expect("workspace");
    let cfg = ws.config();
    let mut script = iteration("<promise>NOTYET</promise>");
    script.push(ScriptedRole::output("planning"));
    script.push(ScriptedRole::failure(3));
    let executor = ScriptedRoleExecutor::new(script);

    let err = run_loops(
        ws.root(),
        &cfg,
        &executor,
        &ShellTestRunner,
        &RunOptions::default(),
        |_| {},
    )
    .expect_err("role failure is fatal");
    assert!(err.to_string().contains("role reviewer exited with status 3"));

    let persisted = state(&ws);
    assert!(persisted.active);
    assert_eq!(persisted.iteration, 2);

    let executor = ScriptedRoleExecutor::new(iteration("<promise>COMPLETE</promise>"));
    let (outcome, iterations) = run(&ws, &cfg, &executor);
    assert_eq!(iterations, vec![2]);
    assert!(outcome.is_complete());
}

/// No workspace change for `threshold` iterations stops the loop as stuck.
#[test]
fn unchanged_workspace_trips_stuck_on_threshold_iteration() {
    let ws = TestWorkspace::new().expect("workspace");
    let cfg = with_loop(&ws, |lp| {
        lp.max_iterations = 10;
        lp.stuck = StuckConfig {
            enabled: true,
            threshold: 2,
            ignore: Vec::new(),
        };
    });
    let mut script = iteration("still working");
    script.extend(iteration("still working"));
    let executor = ScriptedRoleExecutor::new(script);

    let (outcome, iterations) = run(&ws, &cfg, &executor);

    assert_eq!(iterations, vec![1, 2]);
    assert_eq!(
        outcome.stop,
        LoopStop::Stuck {
            loop_id: "main".to_string(),
            iteration: 2,
            streak: 2,
            threshold: 2,
        }
    );
    let paths = LoopPaths::new(ws.root(), "main");
    let report = fs::read_to_string(&paths.stuck_report_path).expect("stuck report");
    assert!(report.contains("Loop `main` stopped: no progress"));
    assert_eq!(
        fs::read_to_string(&paths.gate_summary_path).expect("summary"),
        "promise=false tests=skipped checklist=ok evidence=skipped stuck=2/2\n"
    );
    assert!(!state(&ws).active);

    // A fresh start clears the streak.
    let executor = ScriptedRoleExecutor::new(iteration("<promise>COMPLETE</promise>"));
    let (outcome, iterations) = run(&ws, &cfg, &executor);
    assert_eq!(iterations, vec![1]);
    assert!(outcome.is_complete());
}

/// Progress between iterations keeps the streak at 1.
#[test]
fn workspace_progress_resets_streak() {
    let ws = TestWorkspace::new().expect("workspace");
    let cfg = with_loop(&ws, |lp| {
        lp.max_iterations = 3;
        lp.stuck.threshold = 2;
    });
    let mut script = Vec::new();
    for n in 1..=3 {
        script.push(
            ScriptedRole::output("plan").write_file("src/work.txt", &format!("step {n}")),
        );
        script.push(ScriptedRole::output("review"));
    }
    let executor = ScriptedRoleExecutor::new(script);

    let (outcome, iterations) = run(&ws, &cfg, &executor);

    assert_eq!(iterations, vec![1, 2, 3]);
    assert_eq!(
        outcome.stop,
        LoopStop::Exhausted {
            loop_id: "main".to_string(),
            max_iterations: 3
        }
    );
    let record = load_iteration(&LoopPaths::new(ws.root(), "main"))
        .expect("load")
        .expect("record");
    assert_eq!(record.stuck.map(|s| s.streak), Some(1));
    let persisted = state(&ws);
    assert!(!persisted.active);
    assert_eq!(persisted.iteration, 1);
}

/// A promise with failing tests does not complete; fixing them does.
#[test]
fn failing_tests_block_completion_until_fixed() {
    let ws = TestWorkspace::new().expect("workspace");
    let cfg = with_loop(&ws, |lp| {
        lp.tests = TestsConfig {
            mode: TestMode::Every,
            commands: vec!["test -f fixed.txt".to_string()],
            timeout_secs: 30,
        };
    });
    let mut script = iteration("<promise>COMPLETE</promise>");
    script.push(ScriptedRole::output("fixing").write_file("fixed.txt", "ok"));
    script.push(ScriptedRole::output("<promise>COMPLETE</promise>"));
    let executor = ScriptedRoleExecutor::new(script);

    let (outcome, iterations) = run(&ws, &cfg, &executor);

    assert_eq!(iterations, vec![1, 2]);
    assert!(outcome.is_complete());
    let status: TestStatus = serde_json::from_str(
        &fs::read_to_string(LoopPaths::new(ws.root(), "main").test_status_path).expect("read"),
    )
    .expect("parse");
    assert!(status.ok);
    assert_eq!(status.exit_code, Some(0));
}

/// `on_promise` runs tests once the checklist holds, even without the promise.
#[test]
fn on_promise_runs_tests_when_checklist_already_ok() {
    let ws = TestWorkspace::new().expect("workspace");
    ws.write("PLAN.md", "- [x] done\n```\n- [ ] example only\n```\n")
        .expect("plan");
    let cfg = with_loop(&ws, |lp| {
        lp.max_iterations = 1;
        lp.checklists = vec!["PLAN.md".to_string()];
        lp.tests = TestsConfig {
            mode: TestMode::OnPromise,
            commands: vec!["touch tests-ran".to_string()],
            timeout_secs: 30,
        };
    });
    let executor = ScriptedRoleExecutor::new(iteration("no promise yet"));

    let (outcome, _) = run(&ws, &cfg, &executor);

    assert!(!outcome.is_complete());
    assert!(ws.path("tests-ran").is_file());
    let record = load_iteration(&LoopPaths::new(ws.root(), "main"))
        .expect("load")
        .expect("record");
    assert_eq!(record.tests.state(), GateState::Ok);
    assert!(record.checklist.ok);
}

/// An open checklist item blocks completion; fenced markers never count.
#[test]
fn open_checklist_item_blocks_completion() {
    let ws = TestWorkspace::new().expect("workspace");
    ws.write("PLAN.md", "- [ ] open\n~~~\n- [ ] fenced\n~~~\n")
        .expect("plan");
    let cfg = with_loop(&ws, |lp| {
        lp.max_iterations = 1;
        lp.checklists = vec!["PLAN.md".to_string()];
    });
    let executor = ScriptedRoleExecutor::new(iteration("<promise>COMPLETE</promise>"));

    let (outcome, _) = run(&ws, &cfg, &executor);

    assert!(matches!(outcome.stop, LoopStop::Exhausted { .. }));
    let paths = LoopPaths::new(ws.root(), "main");
    let record = load_iteration(&paths).expect("load").expect("record");
    assert_eq!(record.checklist.remaining, 1);
    assert_eq!(
        fs::read_to_string(&paths.checklist_remaining_path).expect("remaining"),
        "PLAN.md:1: - [ ] open\n"
    );
}

/// Required evidence is written and loops run in configured order.
#[test]
fn multiple_loops_run_in_order_with_evidence() {
    let ws = TestWorkspace::new().expect("workspace");
    ws.write("out/report.txt", "report").expect("artifact");
    let mut cfg = ws.config();
    cfg.loops[0].evidence = EvidenceConfig {
        enabled: true,
        require_on_completion: true,
        artifacts: vec!["out/*.txt".to_string(), "missing/*.bin".to_string()],
    };
    cfg.loops.push(LoopConfig {
        id: "second".to_string(),
        ..ws.loop_config()
    });
    ws.write_config(&cfg).expect("config");
    let mut script = iteration("<promise>COMPLETE</promise>");
    script.extend(iteration("<promise>COMPLETE</promise>"));
    let executor = ScriptedRoleExecutor::new(script);

    let (outcome, iterations) = run(&ws, &cfg, &executor);

    assert!(outcome.is_complete());
    assert_eq!(outcome.loops_completed, vec!["main", "second"]);
    assert_eq!(iterations, vec![1, 1]);

    let manifest: EvidenceManifest = serde_json::from_str(
        &fs::read_to_string(LoopPaths::new(ws.root(), "main").evidence_path).expect("read"),
    )
    .expect("parse");
    assert_eq!(manifest.artifacts.len(), 2);
    assert!(manifest.artifacts[0].exists);
    assert_eq!(manifest.artifacts[1].path, "missing/*.bin");
    assert!(!manifest.artifacts[1].exists);
    assert!(!LoopPaths::new(ws.root(), "second").evidence_path.exists());
}

/// Approval blocks completion until an approved decision is recorded.
#[test]
fn approval_gate_waits_for_decision() {
    let ws = TestWorkspace::new().expect("workspace");
    let cfg = with_loop(&ws, |lp| {
        lp.max_iterations = 1;
        lp.approval = ApprovalConfig { enabled: true };
    });
    let executor = ScriptedRoleExecutor::new(iteration("<promise>COMPLETE</promise>"));

    let (outcome, _) = run(&ws, &cfg, &executor);
    assert!(matches!(outcome.stop, LoopStop::Exhausted { .. }));
    let paths = LoopPaths::new(ws.root(), "main");
    assert!(paths.approval_request_path.is_file());

    gateloop::approve::approve(ws.root(), &cfg, "main", ApprovalDecision::Approved, None)
        .expect("approve");
    let executor = ScriptedRoleExecutor::new(iteration("<promise>COMPLETE</promise>"));
    let (outcome, _) = run(&ws, &cfg, &executor);
    assert!(outcome.is_complete());
    assert!(!paths.approval_path.exists());
    assert!(!paths.approval_request_path.exists());

    // The decision was spent on that attempt; the next one needs its own.
    let executor = ScriptedRoleExecutor::new(iteration("<promise>COMPLETE</promise>"));
    let (outcome, _) = run(&ws, &cfg, &executor);
    assert!(matches!(outcome.stop, LoopStop::Exhausted { .. }));
    assert!(paths.approval_request_path.is_file());
}

/// `--loop` drives only the named loop.
#[test]
fn targeted_loop_runs_alone() {
    let ws = TestWorkspace::new().expect("workspace");
    let mut cfg = ws.config();
    cfg.loops.push(LoopConfig {
        id: "second".to_string(),
        ..ws.loop_config()
    });
    ws.write_config(&cfg).expect("config");
    let executor = ScriptedRoleExecutor::new(iteration("<promise>COMPLETE</promise>"));

    let outcome = run_loops(
        ws.root(),
        &cfg,
        &executor,
        &ShellTestRunner,
        &RunOptions {
            loop_id: Some("second".to_string()),
        },
        |_| {},
    )
    .expect("run");

    assert_eq!(outcome.loops_completed, vec!["second"]);
    assert!(!LoopPaths::new(ws.root(), "main").iteration_path.exists());
}
