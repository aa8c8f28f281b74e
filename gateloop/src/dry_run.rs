//! Read-only gate evaluation for `gateloop run --dry-run`.
//!
//! Recomputes each loop's gate summary from artifacts already on disk. No
//! role is invoked, no test command runs and nothing is written, so repeated
//! dry runs over an unchanged workspace print identical summaries.

use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::{debug, instrument};

use crate::core::gates::{GateSummary, effective_test_mode, evidence_gate, should_run_tests};
use crate::core::stuck::StuckObservation;
use crate::core::types::{GateState, StuckState, TestMode, TestStatus};
use crate::io::checklist::evaluate_checklists;
use crate::io::config::{GateloopConfig, LoopConfig};
use crate::io::evidence::EvidenceManifest;
use crate::io::files::read_json_opt;
use crate::io::iteration_log::{LoopPaths, load_iteration};
use crate::iteration::final_role_promise;

/// Dry-run result for one loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunReport {
    pub loop_id: String,
    pub summary: String,
}

/// Evaluate the selected loops (or all of them) without side effects.
#[instrument(skip_all, fields(only = ?only))]
pub fn dry_run(
    root: &Path,
    config: &GateloopConfig,
    only: Option<&str>,
) -> Result<Vec<DryRunReport>> {
    let loops: Vec<&LoopConfig> = match only {
        Some(id) => vec![
            config
                .find_loop(id)
                .map(|(_, lp)| lp)
                .ok_or_else(|| anyhow!("unknown loop id '{id}'"))?,
        ],
        None => config.loops.iter().collect(),
    };

    loops
        .into_iter()
        .map(|lp| {
            let summary = summarize_loop(root, lp)?;
            debug!(loop_id = %lp.id, summary = %summary, "dry-run summary");
            Ok(DryRunReport {
                loop_id: lp.id.clone(),
                summary,
            })
        })
        .collect()
}

fn summarize_loop(root: &Path, lp: &LoopConfig) -> Result<String> {
    let paths = LoopPaths::new(root, &lp.id);

    let promise_matched = match load_iteration(&paths)? {
        Some(record) => {
            final_role_promise(
                &record.final_output_path,
                &record.final_transcript_path,
                &lp.completion_promise,
            )?
            .matched
        }
        None => false,
    };

    let checklist_ok = evaluate_checklists(root, &lp.checklists)?.status.ok;

    let mode = effective_test_mode(lp.tests.mode, &lp.tests.commands);
    let tests = match read_json_opt::<TestStatus>(&paths.test_status_path)? {
        Some(status) if mode != TestMode::Disabled => status.state(),
        _ if should_run_tests(mode, promise_matched, checklist_ok) => GateState::Failed,
        _ => GateState::Skipped,
    };

    let built = lp.evidence.enabled
        && matches!(
            read_json_opt::<EvidenceManifest>(&paths.evidence_path),
            Ok(Some(_))
        );
    let (evidence, _) = evidence_gate(lp.evidence.enabled, lp.evidence.require_on_completion, built);

    let stuck = if lp.stuck.enabled {
        let streak = read_json_opt::<StuckState>(&paths.stuck_state_path)?
            .map_or(0, |state| state.streak);
        Some(StuckObservation {
            streak,
            threshold: lp.stuck.threshold,
            tripped: streak >= lp.stuck.threshold,
        })
    } else {
        None
    };

    Ok(GateSummary {
        promise_matched,
        tests,
        checklist_ok,
        evidence,
        stuck,
    }
    .render())
}
