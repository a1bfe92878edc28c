//! Choosing the snapshot a new run is compared against.

use super::metadata::{SnapshotMetadata, METADATA_FILENAME};
use crate::utils::errors::Result;
use std::cmp::Reverse;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Outcome of looking for a comparison base
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Newest successful sibling snapshot, if any
    pub chosen: Option<SnapshotMetadata>,

    /// Failed snapshots newer than `chosen` that were passed over
    pub skipped_failed: Vec<String>,
}

/// Pick the newest successful snapshot under `backup_root`, ignoring `current`.
///
/// Siblings without a readable `metadata.json` are ignored. Snapshots are
/// ordered by `started`, newest first; equal timestamps fall back to the
/// directory name so the choice is deterministic.
pub fn select_comparison(backup_root: &Path, current: &Path) -> Result<Selection> {
    let current_name = current.file_name();
    let mut candidates = Vec::new();

    for entry in fs::read_dir(backup_root)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %backup_root.display(), error = %e, "Failed to read backup root entry");
                continue;
            }
        };

        let path = entry.path();
        if !path.is_dir() || Some(entry.file_name().as_os_str()) == current_name {
            continue;
        }
        if !path.join(METADATA_FILENAME).is_file() {
            debug!(path = %path.display(), "No metadata record, not a snapshot");
            continue;
        }

        match SnapshotMetadata::read(&path) {
            Ok(metadata) => candidates.push(metadata),
            Err(e) => warn!(path = %path.display(), error = %e, "Unreadable snapshot metadata"),
        }
    }

    candidates.sort_by_key(|m| Reverse((m.started, m.name.clone())));

    let mut selection = Selection::default();
    for metadata in candidates {
        if metadata.successful {
            info!(snapshot = %metadata.name, started = %metadata.started, "Comparing with last successful backup");
            selection.chosen = Some(metadata);
            break;
        }
        warn!(
            snapshot = %metadata.name,
            "Backup did not finish successfully and is skipped as comparison base; it should probably be deleted"
        );
        selection.skipped_failed.push(metadata.name);
    }

    Ok(selection)
}
