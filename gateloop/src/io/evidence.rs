//! Evidence manifest assembly: an auditable snapshot of gate state.
//!
//! The manifest records state, not judgment. Artifact existence is captured
//! for auditors but does not by itself block completion.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::types::{ChecklistStatus, GateState, TestMode, TestStatus};
use crate::io::files::write_json;
use crate::io::hashing::file_sha256;
use crate::io::resolve::resolve_pattern;
use crate::io::timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceManifest {
    pub generated_at: String,
    pub loop_id: String,
    pub iteration: u32,
    pub spec_file: String,
    pub tests: TestEvidence,
    pub checklists: ChecklistEvidence,
    pub artifacts: Vec<ArtifactEvidence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestEvidence {
    pub mode: TestMode,
    pub commands: Vec<String>,
    pub status: GateState,
    /// Hash of the test transcript, if one was written.
    pub output_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistEvidence {
    pub patterns: Vec<String>,
    pub status: ChecklistStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEvidence {
    /// The declared pattern this entry accounts for.
    pub pattern: String,
    pub path: String,
    pub exists: bool,
    pub content_hash: Option<String>,
}

/// Everything needed to assemble one manifest.
#[derive(Debug, Clone)]
pub struct EvidenceInput<'a> {
    pub root: &'a Path,
    pub loop_id: &'a str,
    pub iteration: u32,
    pub spec_file: &'a str,
    pub tests: &'a TestStatus,
    pub test_output_path: &'a Path,
    pub checklist_patterns: &'a [String],
    pub checklist: &'a ChecklistStatus,
    pub artifact_patterns: &'a [String],
}

/// Assemble the manifest, hashing every resolved artifact.
///
/// A pattern resolving to zero files still yields one `exists = false` entry,
/// so every declared obligation is accounted for.
#[instrument(skip_all, fields(loop_id = input.loop_id, iteration = input.iteration))]
pub fn build_manifest(input: &EvidenceInput<'_>) -> Result<EvidenceManifest> {
    let mut artifacts = Vec::new();
    for pattern in input.artifact_patterns {
        let resolved = resolve_pattern(input.root, pattern)?;
        if resolved.is_empty() {
            artifacts.push(ArtifactEvidence {
                pattern: pattern.clone(),
                path: pattern.clone(),
                exists: false,
                content_hash: None,
            });
            continue;
        }
        for file in resolved {
            let content_hash = if file.abs.is_file() {
                file_sha256(&file.abs)?
            } else {
                None
            };
            artifacts.push(ArtifactEvidence {
                pattern: pattern.clone(),
                path: file.rel,
                exists: content_hash.is_some(),
                content_hash,
            });
        }
    }
    debug!(artifacts = artifacts.len(), "evidence artifacts resolved");

    Ok(EvidenceManifest {
        generated_at: timestamp::now(),
        loop_id: input.loop_id.to_string(),
        iteration: input.iteration,
        spec_file: input.spec_file.to_string(),
        tests: TestEvidence {
            mode: input.tests.mode,
            commands: input.tests.commands.clone(),
            status: input.tests.state(),
            output_hash: file_sha256(input.test_output_path)?,
        },
        checklists: ChecklistEvidence {
            patterns: input.checklist_patterns.to_vec(),
            status: input.checklist.clone(),
        },
        artifacts,
    })
}

/// Build and write the manifest in one step.
pub fn write_manifest(path: &Path, input: &EvidenceInput<'_>) -> Result<EvidenceManifest> {
    let manifest = build_manifest(input)?;
    write_json(path, &manifest)?;
    Ok(manifest)
}
