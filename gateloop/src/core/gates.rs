//! Gate algebra: test-mode policy, gate combination and the summary line.

use crate::core::stuck::StuckObservation;
use crate::core::types::{GateResult, GateState, TestMode};

/// Resolve the mode actually in effect; no commands means tests are disabled.
pub fn effective_test_mode(mode: TestMode, commands: &[String]) -> TestMode {
    if commands.is_empty() {
        TestMode::Disabled
    } else {
        mode
    }
}

/// Decide whether tests run this iteration.
///
/// `on_promise` also runs when the checklist already holds, so a
/// checklist-complete loop gets tested before the final role emits the token.
pub fn should_run_tests(mode: TestMode, promise_matched: bool, checklist_ok: bool) -> bool {
    match mode {
        TestMode::Disabled => false,
        TestMode::Every => true,
        TestMode::OnPromise => promise_matched || checklist_ok,
    }
}

/// Evidence is load-bearing only when required on completion.
pub fn evidence_gate(enabled: bool, require_on_completion: bool, built: bool) -> (GateState, bool) {
    if !enabled {
        return (GateState::Skipped, true);
    }
    let state = if built {
        GateState::Ok
    } else {
        GateState::Failed
    };
    (state, built || !require_on_completion)
}

/// Inputs for the one-line gate summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSummary {
    pub promise_matched: bool,
    pub tests: GateState,
    pub checklist_ok: bool,
    pub evidence: GateState,
    /// `None` when stuck detection is disabled.
    pub stuck: Option<StuckObservation>,
}

impl GateSummary {
    /// Render `promise=<bool> tests=.. checklist=.. evidence=.. stuck=<streak>/<threshold|n/a>`.
    pub fn render(&self) -> String {
        let stuck = match self.stuck {
            Some(obs) => format!("{}/{}", obs.streak, obs.threshold),
            None => "0/n/a".to_string(),
        };
        format!(
            "promise={} tests={} checklist={} evidence={} stuck={}",
            self.promise_matched,
            self.tests.as_str(),
            if self.checklist_ok { "ok" } else { "remaining" },
            self.evidence.as_str(),
            stuck
        )
    }
}

/// Combine individual gate outcomes.
pub fn combine(
    promise_matched: bool,
    tests: GateState,
    checklist_ok: bool,
    evidence_ok: bool,
    approval_ok: bool,
) -> GateResult {
    GateResult {
        promise_matched,
        tests_ok: tests.is_ok(),
        checklist_ok,
        evidence_ok,
        approval_ok,
    }
}
