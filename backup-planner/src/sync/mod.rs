//! Diff-and-plan engine.
//!
//! - [`diff`]: merge-join of the source and comparison trees
//! - [`plan`]: per-mode classification of merged entries into actions
//! - [`action`]: the action model persisted in `actions.json`

pub mod action;
pub mod diff;
pub mod plan;

use crate::fs::collate::SEPARATOR;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The three directories a run reads from and writes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDirs {
    /// Tree being backed up
    #[serde(rename = "sourceDirectory")]
    pub source: PathBuf,

    /// Tree the source is diffed against (previous snapshot or the target itself)
    #[serde(rename = "comparisonDirectory")]
    pub comparison: PathBuf,

    /// Tree being written
    #[serde(rename = "targetDirectory")]
    pub target: PathBuf,
}

impl SyncDirs {
    pub fn new(
        source: impl Into<PathBuf>,
        comparison: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: source.into(),
            comparison: comparison.into(),
            target: target.into(),
        }
    }

    /// True when the comparison tree is the tree being mutated, not a separate snapshot
    pub fn comparison_is_target(&self) -> bool {
        self.comparison == self.target
    }
}

/// Join a `/`-separated relative path onto `root`
pub fn resolve(root: &Path, relative: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for part in relative.split(SEPARATOR).filter(|p| !p.is_empty()) {
        path.push(part);
    }
    path
}
