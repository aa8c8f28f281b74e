//! Streak bookkeeping for no-progress detection.

use serde::Serialize;

use crate::core::types::StuckState;

/// Outcome of one stuck observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StuckObservation {
    pub streak: u32,
    pub threshold: u32,
    pub tripped: bool,
}

/// Fold a new workspace signature into the previous stuck state.
///
/// An unchanged signature extends the streak; anything else (including no
/// previous state) starts a new streak of 1. Trips once `streak >= threshold`.
pub fn advance(
    previous: Option<&StuckState>,
    signature: &str,
    threshold: u32,
    now: String,
) -> (StuckState, StuckObservation) {
    let streak = match previous {
        Some(prev) if prev.signature == signature => prev.streak.saturating_add(1),
        _ => 1,
    };
    let state = StuckState {
        signature: signature.to_string(),
        streak,
        threshold,
        updated_at: now,
    };
    let observation = StuckObservation {
        streak,
        threshold,
        tripped: streak >= threshold,
    };
    (state, observation)
}
