//! External approval records for the approval gate.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::core::types::{GateResult, GateState};
use crate::io::files::{read_json_opt, write_json};
use crate::io::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

/// Decision written by `gateloop approve` (`approval.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub note: Option<String>,
    pub decided_at: String,
}

/// Written when approval is the only gate left (`approval-request.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub loop_id: String,
    pub iteration: u32,
    pub gate_summary: String,
    pub gates: GateResult,
    pub requested_at: String,
}

pub fn load_approval(path: &Path) -> Result<Option<ApprovalRecord>> {
    read_json_opt(path)
}

#[instrument(skip_all, fields(decision = ?decision))]
pub fn record_decision(
    path: &Path,
    decision: ApprovalDecision,
    note: Option<String>,
) -> Result<ApprovalRecord> {
    let record = ApprovalRecord {
        decision,
        note,
        decided_at: timestamp::now(),
    };
    write_json(path, &record)?;
    info!(path = %path.display(), "approval decision recorded");
    Ok(record)
}

/// Evaluate the approval gate. Disabled means skipped and satisfied.
pub fn approval_gate(enabled: bool, path: &Path) -> Result<(GateState, bool)> {
    if !enabled {
        return Ok((GateState::Skipped, true));
    }
    let approved = matches!(
        load_approval(path)?,
        Some(ApprovalRecord {
            decision: ApprovalDecision::Approved,
            ..
        })
    );
    let state = if approved {
        GateState::Ok
    } else {
        GateState::Failed
    };
    Ok((state, approved))
}

pub fn write_request(path: &Path, request: &ApprovalRequest) -> Result<()> {
    write_json(path, request)
}

/// Remove the decision and any pending request once an approval has been
/// spent on a completed loop. Returns whether a decision was removed.
pub fn consume_approval(approval_path: &Path, request_path: &Path) -> Result<bool> {
    let removed = remove_if_present(approval_path)?;
    remove_if_present(request_path)?;
    if removed {
        info!(path = %approval_path.display(), "approval consumed");
    }
    Ok(removed)
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}
