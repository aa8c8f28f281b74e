//! `gateloop approve`: record an external approval decision for a loop.

use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::warn;

use crate::io::approval::{ApprovalDecision, ApprovalRecord, record_decision};
use crate::io::config::GateloopConfig;
use crate::io::iteration_log::LoopPaths;

pub fn approve(
    root: &Path,
    config: &GateloopConfig,
    loop_id: &str,
    decision: ApprovalDecision,
    note: Option<String>,
) -> Result<ApprovalRecord> {
    let (_, lp) = config
        .find_loop(loop_id)
        .ok_or_else(|| anyhow!("unknown loop id '{loop_id}'"))?;
    if !lp.approval.enabled {
        warn!(loop_id, "approval gate is disabled for this loop; recording anyway");
    }
    record_decision(&LoopPaths::new(root, loop_id).approval_path, decision, note)
}
