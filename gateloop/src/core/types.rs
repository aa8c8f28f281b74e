//! Shared deterministic types for gate evaluation.
//!
//! These types define stable contracts between the controller and its gate
//! evaluators. Their serialized forms are the hand-off surface to reporting
//! tools, so field names and enum spellings must stay stable.

use serde::{Deserialize, Serialize};

/// When the configured test commands run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMode {
    /// Tests never run and never block completion.
    #[default]
    Disabled,
    /// Tests run after every iteration.
    Every,
    /// Tests run only once the promise matched or the checklist gate holds.
    OnPromise,
}

impl TestMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TestMode::Disabled => "disabled",
            TestMode::Every => "every",
            TestMode::OnPromise => "on_promise",
        }
    }
}

/// Three-way outcome for gates that may be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    Ok,
    Failed,
    Skipped,
}

impl GateState {
    /// Skipped gates are vacuously satisfied.
    pub fn is_ok(self) -> bool {
        self != GateState::Failed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GateState::Ok => "ok",
            GateState::Failed => "failed",
            GateState::Skipped => "skipped",
        }
    }
}

/// Result of resolving and scanning the configured checklists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistStatus {
    pub ok: bool,
    /// Unchecked markers plus missing files.
    pub remaining: usize,
    /// Missing files (already included in `remaining`).
    pub missing: usize,
    pub generated_at: String,
}

/// Result of running the configured test commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStatus {
    pub ok: bool,
    pub skipped: bool,
    /// Exit code of the last command that ran (diagnostic only).
    pub exit_code: Option<i32>,
    pub mode: TestMode,
    pub commands: Vec<String>,
    pub generated_at: String,
}

impl TestStatus {
    pub fn skipped(mode: TestMode, commands: &[String], generated_at: String) -> Self {
        Self {
            ok: true,
            skipped: true,
            exit_code: None,
            mode,
            commands: commands.to_vec(),
            generated_at,
        }
    }

    pub fn state(&self) -> GateState {
        if self.skipped {
            GateState::Skipped
        } else if self.ok {
            GateState::Ok
        } else {
            GateState::Failed
        }
    }
}

/// Persisted no-progress tracker for one loop (`stuck.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StuckState {
    pub signature: String,
    pub streak: u32,
    pub threshold: u32,
    pub updated_at: String,
}

/// Composite of the five completion gates for one iteration.
///
/// Disabled gates are always `true`; they never block completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub promise_matched: bool,
    pub tests_ok: bool,
    pub checklist_ok: bool,
    pub evidence_ok: bool,
    pub approval_ok: bool,
}

impl GateResult {
    pub fn is_complete(&self) -> bool {
        self.promise_matched
            && self.tests_ok
            && self.checklist_ok
            && self.evidence_ok
            && self.approval_ok
    }

    /// True when only the approval gate blocks completion.
    pub fn awaiting_approval(&self) -> bool {
        !self.approval_ok
            && self.promise_matched
            && self.tests_ok
            && self.checklist_ok
            && self.evidence_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_true() -> GateResult {
        GateResult {
            promise_matched: true,
            tests_ok: true,
            checklist_ok: true,
            evidence_ok: true,
            approval_ok: true,
        }
    }

    #[test]
    fn complete_requires_every_gate() {
        assert!(all_true().is_complete());
        let gates = GateResult {
            tests_ok: false,
            ..all_true()
        };
        assert!(!gates.is_complete());
        assert!(!gates.awaiting_approval());
    }

    #[test]
    fn awaiting_approval_only_when_other_gates_hold() {
        let gates = GateResult {
            approval_ok: false,
            ..all_true()
        };
        assert!(gates.awaiting_approval());
        assert!(!gates.is_complete());
    }

    #[test]
    fn test_mode_serializes_snake_case() {
        let json = serde_json::to_string(&TestMode::OnPromise).expect("serialize");
        assert_eq!(json, "\"on_promise\"");
        let mode: TestMode = serde_json::from_str("\"every\"").expect("parse");
        assert_eq!(mode, TestMode::Every);
    }

    #[test]
    fn skipped_tests_are_vacuously_ok() {
        let status = TestStatus::skipped(TestMode::OnPromise, &[], "now".to_string());
        assert!(status.ok);
        assert_eq!(status.state(), GateState::Skipped);
        assert!(status.state().is_ok());
    }
}
