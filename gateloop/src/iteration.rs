//! Orchestration for a single loop iteration.
//!
//! Dispatches every role in order, then evaluates the gates (promise,
//! checklists, tests, evidence, approval), observes stuck state when the
//! loop is not complete, and writes the iteration record.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::gates::{GateSummary, combine, effective_test_mode, evidence_gate};
use crate::core::promise::{extract_promise, promise_matches};
use crate::core::stuck::StuckObservation;
use crate::core::types::{ChecklistStatus, GateResult, TestStatus};
use crate::io::approval::{ApprovalRequest, approval_gate, write_request};
use crate::io::checklist::{ChecklistArtifacts, check_checklists};
use crate::io::config::{LoopConfig, RunnerConfig};
use crate::io::evidence::{EvidenceInput, write_manifest};
use crate::io::executor::{RoleExecutor, RoleRequest};
use crate::io::files::{read_text_lossy_opt, write_json, write_text};
use crate::io::init::GateloopPaths;
use crate::io::iteration_log::{IterationRecord, LoopPaths, StuckSummary, write_iteration};
use crate::io::prompt::{PromptInputs, render_role_prompt};
use crate::io::stuck::StuckDetector;
use crate::io::test_runner::{TestRequest, TestRunner, run_tests_if_needed};
use crate::io::timestamp;

/// Everything one iteration needs to know about where it runs.
#[derive(Debug, Clone, Copy)]
pub struct IterationContext<'a> {
    pub root: &'a Path,
    pub runner: &'a RunnerConfig,
    pub loop_cfg: &'a LoopConfig,
    pub iteration: u32,
}

/// Result of one iteration.
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub record: IterationRecord,
    pub gates: GateResult,
    /// `Some` when stuck detection observed this iteration.
    pub stuck: Option<StuckObservation>,
}

impl IterationOutcome {
    pub fn is_complete(&self) -> bool {
        self.gates.is_complete()
    }
}

/// Run all roles once and evaluate every gate.
///
/// Role failures propagate as errors; gate failures are reported in the
/// outcome and never fail the call.
#[instrument(skip_all, fields(loop_id = %ctx.loop_cfg.id, iteration = ctx.iteration))]
pub fn run_iteration<E: RoleExecutor, T: TestRunner>(
    ctx: &IterationContext<'_>,
    executor: &E,
    test_runner: &T,
) -> Result<IterationOutcome> {
    let loop_cfg = ctx.loop_cfg;
    let paths = LoopPaths::new(ctx.root, &loop_cfg.id);
    let workspace = GateloopPaths::new(ctx.root);

    let mut final_output_path = PathBuf::new();
    let mut final_transcript_path = PathBuf::new();
    for role in &loop_cfg.roles {
        let output = dispatch_role(ctx, &paths, &workspace, role, executor)?;
        final_output_path = output.0;
        final_transcript_path = output.1;
    }

    let FinalPromise {
        promise,
        matched: promise_matched,
    } = final_role_promise(
        &final_output_path,
        &final_transcript_path,
        &loop_cfg.completion_promise,
    )?;
    debug!(promise = ?promise, promise_matched, "promise extracted");

    // Checklists.
    let checklist = check_checklists(
        ctx.root,
        &loop_cfg.checklists,
        &ChecklistArtifacts {
            status_path: &paths.checklist_status_path,
            remaining_path: &paths.checklist_remaining_path,
            missing_path: &paths.checklist_missing_path,
        },
    )?;

    // Tests.
    let mode = effective_test_mode(loop_cfg.tests.mode, &loop_cfg.tests.commands);
    let tests = run_tests_if_needed(
        test_runner,
        &TestRequest {
            workdir: ctx.root.to_path_buf(),
            commands: loop_cfg.tests.commands.clone(),
            mode,
            transcript_path: paths.test_output_path.clone(),
            timeout: Duration::from_secs(loop_cfg.tests.timeout_secs),
            output_limit_bytes: ctx.runner.output_limit_bytes,
        },
        promise_matched,
        checklist.ok,
    )?;
    write_json(&paths.test_status_path, &tests)?;

    // Evidence.
    let built = if loop_cfg.evidence.enabled {
        build_evidence(ctx, &paths, &tests, &checklist)
    } else {
        false
    };
    let (evidence, evidence_ok) = evidence_gate(
        loop_cfg.evidence.enabled,
        loop_cfg.evidence.require_on_completion,
        built,
    );

    // Approval.
    let (approval, approval_ok) = approval_gate(loop_cfg.approval.enabled, &paths.approval_path)?;

    let gates = combine(
        promise_matched,
        tests.state(),
        checklist.ok,
        evidence_ok,
        approval_ok,
    );
    let complete = gates.is_complete();

    let stuck = if !loop_cfg.stuck.enabled {
        None
    } else {
        let detector = StuckDetector::new(
            ctx.root,
            &loop_cfg.stuck.ignore,
            loop_cfg.stuck.threshold,
            &paths.stuck_state_path,
        );
        if complete {
            let streak = detector.load()?.map_or(0, |s| s.streak);
            Some(StuckObservation {
                streak,
                threshold: loop_cfg.stuck.threshold,
                tripped: false,
            })
        } else {
            Some(detector.observe()?)
        }
    };

    let summary = GateSummary {
        promise_matched,
        tests: tests.state(),
        checklist_ok: checklist.ok,
        evidence,
        stuck,
    }
    .render();

    if gates.awaiting_approval() {
        info!("all gates hold except approval; requesting approval");
        write_request(
            &paths.approval_request_path,
            &ApprovalRequest {
                loop_id: loop_cfg.id.clone(),
                iteration: ctx.iteration,
                gate_summary: summary.clone(),
                gates,
                requested_at: timestamp::now(),
            },
        )?;
    }

    let mut record = IterationRecord {
        loop_id: loop_cfg.id.clone(),
        iteration: ctx.iteration,
        last_role: loop_cfg.final_role().to_string(),
        final_output_path: final_output_path.clone(),
        final_transcript_path,
        promise,
        promise_matched,
        checklist,
        tests,
        evidence,
        approval,
        stuck: stuck.map(|obs| StuckSummary {
            streak: obs.streak,
            threshold: obs.threshold,
            tripped: obs.tripped,
        }),
        gates,
        complete,
        summary,
        next_steps: String::new(),
        generated_at: timestamp::now(),
    };
    record.next_steps = record.describe_next_steps();
    write_iteration(&paths, &record)?;
    info!(summary = %record.summary, complete, "iteration finished");

    Ok(IterationOutcome {
        record,
        gates,
        stuck: if complete { None } else { stuck },
    })
}

/// Completion token found in the final role's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalPromise {
    pub promise: Option<String>,
    pub matched: bool,
}

/// Scan the final role's raw output for the promise, falling back to its
/// transcript when the raw output is missing or blank.
pub fn final_role_promise(
    raw_output_path: &Path,
    transcript_path: &Path,
    expected: &str,
) -> Result<FinalPromise> {
    let text = match read_text_lossy_opt(raw_output_path)? {
        Some(text) if !text.trim().is_empty() => text,
        _ => read_text_lossy_opt(transcript_path)?.unwrap_or_default(),
    };
    Ok(FinalPromise {
        promise: extract_promise(&text),
        matched: promise_matches(&text, expected),
    })
}

fn dispatch_role<E: RoleExecutor>(
    ctx: &IterationContext<'_>,
    paths: &LoopPaths,
    workspace: &GateloopPaths,
    role: &str,
    executor: &E,
) -> Result<(PathBuf, PathBuf)> {
    let prompt = render_role_prompt(&PromptInputs {
        root: ctx.root,
        loop_cfg: ctx.loop_cfg,
        paths,
        role,
        iteration: ctx.iteration,
        template_path: workspace.role_template_path(role),
    })?;
    let prompt_path = paths.prompt_path(role);
    write_text(&prompt_path, &prompt)?;

    let report_path = paths.report_path(role);
    let snapshot = ReportSnapshot::capture(&report_path)?;

    info!(role, "dispatching role");
    let output = executor.execute(&RoleRequest {
        role: role.to_string(),
        iteration: ctx.iteration,
        workdir: ctx.root.to_path_buf(),
        prompt,
        raw_output_path: paths.raw_output_path(ctx.iteration, role),
        transcript_path: paths.transcript_path(ctx.iteration, role),
        timeout: Duration::from_secs(ctx.runner.timeout_secs),
        output_limit_bytes: ctx.runner.output_limit_bytes,
    })?;

    if snapshot.restore_if_unchanged()? {
        debug!(role, "report unchanged; modification time restored");
    }
    Ok((output.raw_output_path, output.transcript_path))
}

/// Failure to build the manifest is recorded as a failed evidence gate.
fn build_evidence(
    ctx: &IterationContext<'_>,
    paths: &LoopPaths,
    tests: &TestStatus,
    checklist: &ChecklistStatus,
) -> bool {
    let input = EvidenceInput {
        root: ctx.root,
        loop_id: &ctx.loop_cfg.id,
        iteration: ctx.iteration,
        spec_file: &ctx.loop_cfg.spec_file,
        tests,
        test_output_path: &paths.test_output_path,
        checklist_patterns: &ctx.loop_cfg.checklists,
        checklist,
        artifact_patterns: &ctx.loop_cfg.evidence.artifacts,
    };
    match write_manifest(&paths.evidence_path, &input) {
        Ok(_) => true,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "evidence manifest could not be built");
            false
        }
    }
}

/// A role report as it was before the role ran.
#[derive(Debug)]
struct ReportSnapshot {
    path: PathBuf,
    contents: Option<Vec<u8>>,
    modified: Option<SystemTime>,
}

impl ReportSnapshot {
    fn capture(path: &Path) -> Result<Self> {
        let contents = match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
        };
        let modified = match &contents {
            Some(_) => fs::metadata(path).and_then(|m| m.modified()).ok(),
            None => None,
        };
        Ok(Self {
            path: path.to_path_buf(),
            contents,
            modified,
        })
    }

    /// Put back the original bytes and modification time if the role left
    /// the report byte-identical. Returns whether a restore happened.
    fn restore_if_unchanged(&self) -> Result<bool> {
        let Some(original) = &self.contents else {
            return Ok(false);
        };
        let current = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err).with_context(|| format!("read {}", self.path.display())),
        };
        if &current != original {
            return Ok(false);
        }
        fs::write(&self.path, original)
            .with_context(|| format!("restore {}", self.path.display()))?;
        if let Some(modified) = self.modified {
            File::options()
                .write(true)
                .open(&self.path)
                .and_then(|file| file.set_modified(modified))
                .with_context(|| format!("restore mtime {}", self.path.display()))?;
        }
        Ok(true)
    }
}
