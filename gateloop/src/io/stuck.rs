//! Persisted stuck detection: signature, streak file and trip report.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::stuck::{StuckObservation, advance};
use crate::core::types::StuckState;
use crate::io::files::{read_json_opt, write_json, write_text};
use crate::io::signature::content_signature;
use crate::io::timestamp;

#[derive(Debug, Clone)]
pub struct StuckDetector {
    root: PathBuf,
    ignore: Vec<String>,
    threshold: u32,
    state_path: PathBuf,
}

impl StuckDetector {
    pub fn new(
        root: impl Into<PathBuf>,
        ignore: &[String],
        threshold: u32,
        state_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            ignore: ignore.to_vec(),
            threshold,
            state_path: state_path.into(),
        }
    }

    pub fn load(&self) -> Result<Option<StuckState>> {
        read_json_opt(&self.state_path)
    }

    /// Compute the current signature, fold it into the streak and persist it.
    #[instrument(skip_all, fields(threshold = self.threshold))]
    pub fn observe(&self) -> Result<StuckObservation> {
        let previous = self.load()?;
        let signature = content_signature(&self.root, &self.ignore)?;
        let (state, observation) =
            advance(previous.as_ref(), &signature, self.threshold, timestamp::now());
        write_json(&self.state_path, &state)?;
        if observation.tripped {
            warn!(streak = observation.streak, "no workspace progress detected");
        } else {
            info!(streak = observation.streak, "stuck streak updated");
        }
        Ok(observation)
    }

    /// Forget the streak; used when a loop starts fresh.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.state_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove {}", self.state_path.display())),
        }
    }
}

/// Write the human-readable report left behind when a loop stops as stuck.
pub fn write_stuck_report(
    path: &Path,
    loop_id: &str,
    iteration: u32,
    observation: &StuckObservation,
    gate_summary: &str,
    next_steps: &str,
) -> Result<()> {
    let mut buf = String::new();
    buf.push_str(&format!("# Loop `{loop_id}` stopped: no progress\n\n"));
    buf.push_str(&format!(
        "The workspace content was unchanged for {} consecutive iteration(s) \
         (threshold {}), ending at iteration {iteration}.\n\n",
        observation.streak, observation.threshold
    ));
    buf.push_str(&format!("Last gate summary: `{gate_summary}`\n\n"));
    buf.push_str("## Blocking gates\n\n");
    for line in next_steps.lines() {
        buf.push_str(&format!("- {line}\n"));
    }
    buf.push_str(&format!("\nGenerated at {}\n", timestamp::now()));
    write_text(path, &buf)
}
