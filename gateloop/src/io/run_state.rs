//! Run state storage for resumable loops (`.gateloop/state.json`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::files::{read_json_opt, write_json_atomic};
use crate::io::timestamp;

pub const RUN_STATE_VERSION: u32 = 1;

/// Persisted loop/iteration pointer for the workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunState {
    pub version: u32,
    /// A loop is mid-run; the next start resumes at `iteration`.
    pub active: bool,
    /// Index into the configured loops.
    pub loop_index: usize,
    /// Iteration number (1-indexed) to run next.
    pub iteration: u32,
    pub current_loop_id: Option<String>,
    pub updated_at: String,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            version: RUN_STATE_VERSION,
            active: false,
            loop_index: 0,
            iteration: 1,
            current_loop_id: None,
            updated_at: String::new(),
        }
    }
}

impl RunState {
    pub fn active_at(loop_index: usize, loop_id: &str, iteration: u32) -> Self {
        Self {
            version: RUN_STATE_VERSION,
            active: true,
            loop_index,
            iteration,
            current_loop_id: Some(loop_id.to_string()),
            updated_at: timestamp::now(),
        }
    }

    /// Same pointer, marked inactive so the next start begins at iteration 1.
    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self.iteration = 1;
        self.updated_at = timestamp::now();
        self
    }
}

/// Durable store for the single `RunState` of a workspace.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, or `None` if no run has been recorded yet.
    pub fn load(&self) -> Result<Option<RunState>> {
        let state = read_json_opt::<RunState>(&self.path)
            .with_context(|| format!("load run state {}", self.path.display()))?;
        match &state {
            Some(state) => debug!(
                active = state.active,
                loop_id = ?state.current_loop_id,
                iteration = state.iteration,
                "run state loaded"
            ),
            None => debug!(path = %self.path.display(), "no run state"),
        }
        Ok(state)
    }

    pub fn save(&self, state: &RunState) -> Result<()> {
        debug!(
            active = state.active,
            loop_id = ?state.current_loop_id,
            iteration = state.iteration,
            "saving run state"
        );
        write_json_atomic(&self.path, state)
    }
}
