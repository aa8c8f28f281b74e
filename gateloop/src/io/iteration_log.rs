//! Per-loop artifact layout and the latest iteration record.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::types::{ChecklistStatus, GateResult, GateState, TestStatus};
use crate::io::files::{read_json_opt, read_text_opt, write_json, write_text};

/// Paths of every artifact the controller writes for one loop.
#[derive(Debug, Clone)]
pub struct LoopPaths {
    pub dir: PathBuf,
    pub plan_path: PathBuf,
    pub notes_path: PathBuf,
    pub reports_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub test_output_path: PathBuf,
    pub test_status_path: PathBuf,
    pub checklist_status_path: PathBuf,
    pub checklist_remaining_path: PathBuf,
    pub checklist_missing_path: PathBuf,
    pub evidence_path: PathBuf,
    pub gate_summary_path: PathBuf,
    pub iteration_path: PathBuf,
    pub stuck_state_path: PathBuf,
    pub stuck_report_path: PathBuf,
    pub approval_path: PathBuf,
    pub approval_request_path: PathBuf,
}

impl LoopPaths {
    pub fn new(root: &Path, loop_id: &str) -> Self {
        let dir = root.join(".gateloop").join("loops").join(loop_id);
        Self {
            dir: dir.clone(),
            plan_path: dir.join("plan.md"),
            notes_path: dir.join("iteration_notes.md"),
            reports_dir: dir.join("reports"),
            prompts_dir: dir.join("prompts"),
            logs_dir: dir.join("logs"),
            test_output_path: dir.join("test-output.txt"),
            test_status_path: dir.join("test-status.json"),
            checklist_status_path: dir.join("checklist-status.json"),
            checklist_remaining_path: dir.join("checklist-remaining.txt"),
            checklist_missing_path: dir.join("checklist-missing.txt"),
            evidence_path: dir.join("evidence.json"),
            gate_summary_path: dir.join("gate-summary.txt"),
            iteration_path: dir.join("iteration.json"),
            stuck_state_path: dir.join("stuck.json"),
            stuck_report_path: dir.join("stuck-report.md"),
            approval_path: dir.join("approval.json"),
            approval_request_path: dir.join("approval-request.json"),
        }
    }

    pub fn report_path(&self, role: &str) -> PathBuf {
        self.reports_dir.join(format!("{role}.md"))
    }

    pub fn prompt_path(&self, role: &str) -> PathBuf {
        self.prompts_dir.join(format!("{role}.md"))
    }

    pub fn iteration_logs_dir(&self, iteration: u32) -> PathBuf {
        self.logs_dir.join(format!("iter-{iteration}"))
    }

    pub fn raw_output_path(&self, iteration: u32, role: &str) -> PathBuf {
        self.iteration_logs_dir(iteration).join(format!("{role}.out"))
    }

    pub fn transcript_path(&self, iteration: u32, role: &str) -> PathBuf {
        self.iteration_logs_dir(iteration).join(format!("{role}.log"))
    }
}

/// Summary of the stuck check for one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StuckSummary {
    pub streak: u32,
    pub threshold: u32,
    pub tripped: bool,
}

/// Ephemeral record of the latest iteration (`iteration.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub loop_id: String,
    pub iteration: u32,
    pub last_role: String,
    /// Raw output of the final role (scanned for the promise).
    pub final_output_path: PathBuf,
    /// Transcript of the final role, the fallback promise source.
    #[serde(default)]
    pub final_transcript_path: PathBuf,
    pub promise: Option<String>,
    pub promise_matched: bool,
    pub checklist: ChecklistStatus,
    pub tests: TestStatus,
    pub evidence: GateState,
    pub approval: GateState,
    pub stuck: Option<StuckSummary>,
    pub gates: GateResult,
    pub complete: bool,
    pub summary: String,
    pub next_steps: String,
    pub generated_at: String,
}

impl IterationRecord {
    /// Human-readable note on what blocks completion.
    pub fn describe_next_steps(&self) -> String {
        if self.complete {
            return "All gates satisfied; loop complete.".to_string();
        }
        let mut steps = Vec::new();
        if !self.gates.promise_matched {
            steps.push("Final role has not emitted the completion promise.".to_string());
        }
        if !self.gates.checklist_ok {
            steps.push(format!(
                "Resolve {} remaining checklist item(s) ({} missing file(s)).",
                self.checklist.remaining, self.checklist.missing
            ));
        }
        if !self.gates.tests_ok {
            steps.push(format!(
                "Fix failing tests (last exit code {}).",
                self.tests
                    .exit_code
                    .map_or_else(|| "n/a".to_string(), |c| c.to_string())
            ));
        }
        if !self.gates.evidence_ok {
            steps.push("Evidence manifest could not be built.".to_string());
        }
        if !self.gates.approval_ok {
            steps.push("Awaiting external approval.".to_string());
        }
        steps.join("\n")
    }

    pub fn render_notes(&self) -> String {
        let mut buf = String::new();
        buf.push_str(&format!(
            "# Iteration {} ({})\n\n",
            self.iteration, self.loop_id
        ));
        buf.push_str(&format!("- last role: {}\n", self.last_role));
        buf.push_str(&format!(
            "- promise: {}\n",
            self.promise.as_deref().unwrap_or("(none)")
        ));
        buf.push_str(&format!("- gates: {}\n", self.summary));
        buf.push_str(&format!("- generated at: {}\n", self.generated_at));
        buf.push_str("\n## Next steps\n\n");
        for line in self.next_steps.lines() {
            buf.push_str(&format!("- {line}\n"));
        }
        buf
    }
}

/// Write the record, its notes document and the gate-summary line.
pub fn write_iteration(paths: &LoopPaths, record: &IterationRecord) -> Result<()> {
    // Write in deterministic order to keep artifacts stable.
    write_json(&paths.iteration_path, record)?;
    write_text(&paths.notes_path, &record.render_notes())?;
    write_text(&paths.gate_summary_path, &format!("{}\n", record.summary))
}

pub fn load_iteration(paths: &LoopPaths) -> Result<Option<IterationRecord>> {
    read_json_opt(&paths.iteration_path)
}

pub fn load_gate_summary(paths: &LoopPaths) -> Result<Option<String>> {
    Ok(read_text_opt(&paths.gate_summary_path)?.map(|s| s.trim().to_string()))
}
