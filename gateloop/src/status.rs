//! `gateloop status` and `gateloop cancel`.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::io::config::GateloopConfig;
use crate::io::init::GateloopPaths;
use crate::io::iteration_log::{LoopPaths, load_gate_summary};
use crate::io::run_state::{RunState, StateStore};

/// Latest known state of one loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopStatus {
    pub loop_id: String,
    pub max_iterations: u32,
    /// `None` until the loop has finished an iteration.
    pub gate_summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub state: Option<RunState>,
    pub loops: Vec<LoopStatus>,
}

impl StatusReport {
    pub fn render(&self) -> String {
        let mut buf = String::new();
        match &self.state {
            Some(state) if state.active => {
                let _ = writeln!(
                    buf,
                    "run: active (loop {}, iteration {})",
                    state.current_loop_id.as_deref().unwrap_or("?"),
                    state.iteration
                );
            }
            Some(state) => {
                let _ = writeln!(
                    buf,
                    "run: inactive (last loop {}, updated {})",
                    state.current_loop_id.as_deref().unwrap_or("-"),
                    state.updated_at
                );
            }
            None => buf.push_str("run: never started\n"),
        }
        for lp in &self.loops {
            let max = if lp.max_iterations == 0 {
                "unbounded".to_string()
            } else {
                lp.max_iterations.to_string()
            };
            let _ = writeln!(
                buf,
                "loop {} (max {max}): {}",
                lp.loop_id,
                lp.gate_summary.as_deref().unwrap_or("no iterations yet")
            );
        }
        buf
    }
}

pub fn status(root: &Path, config: &GateloopConfig) -> Result<StatusReport> {
    let state = StateStore::new(GateloopPaths::new(root).state_path).load()?;
    let loops = config
        .loops
        .iter()
        .map(|lp| {
            Ok(LoopStatus {
                loop_id: lp.id.clone(),
                max_iterations: lp.max_iterations,
                gate_summary: load_gate_summary(&LoopPaths::new(root, &lp.id))?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(StatusReport { state, loops })
}

/// Mark the run inactive so the next `run` starts fresh at iteration 1.
///
/// Returns the state that was active, if any.
pub fn cancel(root: &Path) -> Result<Option<RunState>> {
    let store = StateStore::new(GateloopPaths::new(root).state_path);
    let Some(state) = store.load()?.filter(|s| s.active) else {
        return Ok(None);
    };
    store.save(&state.clone().deactivated())?;
    info!(loop_id = ?state.current_loop_id, iteration = state.iteration, "run cancelled");
    Ok(Some(state))
}
