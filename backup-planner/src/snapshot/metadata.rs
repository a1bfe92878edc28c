//! The `metadata.json` record kept in every snapshot directory.

use crate::sync::SyncDirs;
use crate::utils::errors::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File name of the per-snapshot record
pub const METADATA_FILENAME: &str = "metadata.json";

/// One backup run.
///
/// Written with `successful = false` before anything is enumerated and
/// rewritten once execution has finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    /// Directory name of the snapshot
    pub name: String,

    pub successful: bool,

    pub started: DateTime<Utc>,

    #[serde(flatten)]
    pub dirs: SyncDirs,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,

    /// Actions that failed during execution
    #[serde(default)]
    pub failed_actions: usize,
}

impl SnapshotMetadata {
    pub fn new(name: impl Into<String>, dirs: SyncDirs, started: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            successful: false,
            started,
            dirs,
            finished: None,
            failed_actions: 0,
        }
    }

    /// Read the record stored in `snapshot_dir`
    pub fn read(snapshot_dir: &Path) -> Result<Self> {
        let content = fs::read_to_string(snapshot_dir.join(METADATA_FILENAME))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the record into `snapshot_dir`, replacing any previous one
    pub fn write(&self, snapshot_dir: &Path) -> Result<()> {
        let path = snapshot_dir.join(METADATA_FILENAME);
        let tmp = snapshot_dir.join(format!("{}.tmp", METADATA_FILENAME));
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Record the end of execution
    pub fn finish(&mut self, successful: bool, failed_actions: usize) {
        self.successful = successful;
        self.failed_actions = failed_actions;
        self.finished = Some(Utc::now());
    }
}
