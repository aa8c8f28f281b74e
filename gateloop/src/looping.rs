//! Multi-iteration, multi-loop driver for `gateloop run`.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tracing::{info, instrument, warn};

use crate::io::approval::consume_approval;
use crate::io::config::{GateloopConfig, LoopConfig};
use crate::io::executor::RoleExecutor;
use crate::io::init::GateloopPaths;
use crate::io::iteration_log::LoopPaths;
use crate::io::run_state::{RunState, StateStore};
use crate::io::stuck::{StuckDetector, write_stuck_report};
use crate::io::test_runner::TestRunner;
use crate::io::timestamp;
use crate::iteration::{IterationContext, IterationOutcome, run_iteration};

/// Reason why `run_loops` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// Every selected loop satisfied all of its gates.
    Complete,
    /// A loop used up `max_iterations` without completing.
    Exhausted { loop_id: String, max_iterations: u32 },
    /// A loop made no workspace progress for `threshold` iterations.
    Stuck {
        loop_id: String,
        iteration: u32,
        streak: u32,
        threshold: u32,
    },
}

/// Summary of a `run_loops` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Loop id and iteration the run started (or resumed) at.
    pub started_at: Option<(String, u32)>,
    pub iterations_run: u32,
    pub loops_completed: Vec<String>,
    pub stop: LoopStop,
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        self.stop == LoopStop::Complete
    }
}

/// Which loops to drive.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Drive only this loop instead of every configured loop in order.
    pub loop_id: Option<String>,
}

/// A loop's specification document does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingSpecError {
    pub loop_id: String,
    pub path: PathBuf,
}

impl fmt::Display for MissingSpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loop {}: spec file {} does not exist",
            self.loop_id,
            self.path.display()
        )
    }
}

impl std::error::Error for MissingSpecError {}

/// Run loops until every selected loop completes, one is exhausted, or one
/// is stuck.
///
/// Role failures and configuration problems stop immediately with an error;
/// the persisted run state then still points at the failed iteration so the
/// next run resumes there.
#[instrument(skip_all, fields(only = ?options.loop_id))]
pub fn run_loops<E: RoleExecutor, T: TestRunner, F: FnMut(&IterationOutcome)>(
    root: &Path,
    config: &GateloopConfig,
    executor: &E,
    test_runner: &T,
    options: &RunOptions,
    mut on_iteration: F,
) -> Result<RunOutcome> {
    let selected = select_loops(config, options)?;
    let workspace = GateloopPaths::new(root);
    let store = StateStore::new(&workspace.state_path);

    let (start_pos, resume_iteration) = resume_point(store.load()?.as_ref(), &selected);
    let mut started_at = None;
    let mut iterations_run = 0u32;
    let mut loops_completed = Vec::new();

    for (pos, (index, loop_cfg)) in selected.iter().enumerate().skip(start_pos) {
        let (index, loop_cfg) = (*index, *loop_cfg);
        let paths = LoopPaths::new(root, &loop_cfg.id);
        ensure_loop_inputs(root, &workspace, loop_cfg)?;

        let mut iteration = match resume_iteration {
            Some(iteration) if pos == start_pos => {
                info!(loop_id = %loop_cfg.id, iteration, "resuming loop");
                iteration
            }
            _ => {
                info!(loop_id = %loop_cfg.id, "starting loop");
                stuck_detector(root, loop_cfg, &paths).clear()?;
                1
            }
        };
        started_at.get_or_insert_with(|| (loop_cfg.id.clone(), iteration));

        loop {
            if loop_cfg.max_iterations > 0 && iteration > loop_cfg.max_iterations {
                warn!(loop_id = %loop_cfg.id, max = loop_cfg.max_iterations, "iterations exhausted");
                store.save(&RunState::active_at(index, &loop_cfg.id, iteration).deactivated())?;
                return Ok(RunOutcome {
                    started_at,
                    iterations_run,
                    loops_completed,
                    stop: LoopStop::Exhausted {
                        loop_id: loop_cfg.id.clone(),
                        max_iterations: loop_cfg.max_iterations,
                    },
                });
            }

            store.save(&RunState::active_at(index, &loop_cfg.id, iteration))?;
            let outcome = run_iteration(
                &IterationContext {
                    root,
                    runner: &config.runner,
                    loop_cfg,
                    iteration,
                },
                executor,
                test_runner,
            )?;
            iterations_run += 1;
            on_iteration(&outcome);

            if outcome.is_complete() {
                info!(loop_id = %loop_cfg.id, iteration, "loop complete");
                if loop_cfg.approval.enabled {
                    consume_approval(&paths.approval_path, &paths.approval_request_path)?;
                }
                loops_completed.push(loop_cfg.id.clone());
                break;
            }

            if let Some(obs) = outcome.stuck.filter(|obs| obs.tripped) {
                write_stuck_report(
                    &paths.stuck_report_path,
                    &loop_cfg.id,
                    iteration,
                    &obs,
                    &outcome.record.summary,
                    &outcome.record.next_steps,
                )?;
                store.save(&RunState::active_at(index, &loop_cfg.id, iteration).deactivated())?;
                return Ok(RunOutcome {
                    started_at,
                    iterations_run,
                    loops_completed,
                    stop: LoopStop::Stuck {
                        loop_id: loop_cfg.id.clone(),
                        iteration,
                        streak: obs.streak,
                        threshold: obs.threshold,
                    },
                });
            }

            iteration += 1;
            store.save(&RunState::active_at(index, &loop_cfg.id, iteration))?;
        }
    }

    store.save(&RunState {
        updated_at: timestamp::now(),
        ..RunState::default()
    })?;
    Ok(RunOutcome {
        started_at,
        iterations_run,
        loops_completed,
        stop: LoopStop::Complete,
    })
}

fn select_loops<'a>(
    config: &'a GateloopConfig,
    options: &RunOptions,
) -> Result<Vec<(usize, &'a LoopConfig)>> {
    match &options.loop_id {
        Some(id) => {
            let found = config
                .find_loop(id)
                .ok_or_else(|| anyhow!("unknown loop id '{id}'"))?;
            Ok(vec![found])
        }
        None => Ok(config.loops.iter().enumerate().collect()),
    }
}

/// Position in `selected` to start from, and the iteration to resume at.
///
/// Only an active state whose loop is among the selected loops resumes.
fn resume_point(state: Option<&RunState>, selected: &[(usize, &LoopConfig)]) -> (usize, Option<u32>) {
    let Some(state) = state.filter(|s| s.active) else {
        return (0, None);
    };
    let Some(loop_id) = state.current_loop_id.as_deref() else {
        return (0, None);
    };
    match selected.iter().position(|(_, lp)| lp.id == loop_id) {
        Some(pos) => (pos, Some(state.iteration.max(1))),
        None => (0, None),
    }
}

/// Fail before any role runs if the spec file or a role template is missing.
fn ensure_loop_inputs(root: &Path, workspace: &GateloopPaths, loop_cfg: &LoopConfig) -> Result<()> {
    let spec_path = root.join(&loop_cfg.spec_file);
    if !spec_path.is_file() {
        return Err(MissingSpecError {
            loop_id: loop_cfg.id.clone(),
            path: spec_path,
        }
        .into());
    }
    for role in &loop_cfg.roles {
        let template = workspace.role_template_path(role);
        if !template.is_file() {
            return Err(anyhow!(
                "loop {}: missing role template {}",
                loop_cfg.id,
                template.display()
            ));
        }
    }
    Ok(())
}

fn stuck_detector(root: &Path, loop_cfg: &LoopConfig, paths: &LoopPaths) -> StuckDetector {
    StuckDetector::new(
        root,
        &loop_cfg.stuck.ignore,
        loop_cfg.stuck.threshold,
        &paths.stuck_state_path,
    )
}
