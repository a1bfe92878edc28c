//! Where a run writes to and what it compares against.
//!
//! Versioned runs get a fresh `<target_root>/<version name>` directory (with a
//! ` #2`, ` #3`, ... suffix when the name is taken) holding `metadata.json`,
//! `actions.json` and the copy of the source under the source's own directory
//! name. Unversioned runs write straight into the target root.

use super::metadata::SnapshotMetadata;
use super::selector::select_comparison;
use crate::config::BackupConfig;
use crate::sync::SyncDirs;
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Local, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Resolved directories of one run
#[derive(Debug, Clone)]
pub struct RunLayout {
    /// Directory holding `metadata.json` and `actions.json`
    pub snapshot_dir: PathBuf,

    pub versioned: bool,

    pub dirs: SyncDirs,
}

impl RunLayout {
    /// Bookkeeping files live inside the compared tree only for unversioned runs
    pub fn bookkeeping_in_tree(&self) -> bool {
        !self.versioned
    }
}

/// Create the snapshot directory, choose the comparison base and write the
/// initial (unsuccessful) metadata record.
pub fn prepare_run(config: &BackupConfig, now: DateTime<Local>) -> Result<(RunLayout, SnapshotMetadata)> {
    let source = fs::canonicalize(&config.source_dir)?;
    let source_name = source.file_name().ok_or_else(|| {
        BackupError::Config(format!("Source directory '{}' has no name", source.display()))
    })?;

    let target_root = &config.target_dir;
    fs::create_dir_all(target_root)?;

    let layout = if config.is_versioned() {
        let base_name = now.format(&config.version_name).to_string();
        let snapshot_dir = create_snapshot_dir(target_root, &base_name)?;
        let target = snapshot_dir.join(source_name);
        fs::create_dir_all(&target)?;

        let comparison = if config.compares_with_last_backup() {
            select_comparison(target_root, &snapshot_dir)?
                .chosen
                .map(|previous| target_root.join(&previous.name).join(source_name))
                .unwrap_or_else(|| target.clone())
        } else {
            target.clone()
        };

        RunLayout {
            snapshot_dir,
            versioned: true,
            dirs: SyncDirs::new(source, comparison, target),
        }
    } else {
        RunLayout {
            snapshot_dir: target_root.clone(),
            versioned: false,
            dirs: SyncDirs::new(source, target_root.clone(), target_root.clone()),
        }
    };

    let name = layout
        .snapshot_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let metadata = SnapshotMetadata::new(name, layout.dirs.clone(), now.with_timezone(&Utc));
    metadata.write(&layout.snapshot_dir)?;

    info!(source = %layout.dirs.source.display(), "Source directory");
    info!(snapshot = %layout.snapshot_dir.display(), "Snapshot directory");
    info!(target = %layout.dirs.target.display(), "Target directory");
    info!(comparison = %layout.dirs.comparison.display(), "Comparison directory");

    Ok((layout, metadata))
}

/// Create `<root>/<base_name>`, appending ` #N` until the name is free
fn create_snapshot_dir(root: &Path, base_name: &str) -> Result<PathBuf> {
    if base_name.is_empty() || base_name.contains(['/', '\\']) || base_name == "." || base_name == ".." {
        return Err(BackupError::Snapshot(format!(
            "'{}' is not usable as a snapshot directory name",
            base_name
        )));
    }

    let mut suffix = 1u32;
    loop {
        let name = if suffix > 1 {
            format!("{} #{}", base_name, suffix)
        } else {
            base_name.to_string()
        };
        let path = root.join(&name);

        match fs::create_dir(&path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                suffix += 1;
                warn!(
                    snapshot = %path.display(),
                    "Snapshot directory already exists, appending suffix '#{}'",
                    suffix
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackupMode;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 17, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_versioned_layout() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let source = temp_dir.path().join("data");
        fs::create_dir(&source)?;
        let config = BackupConfig::new(&source, temp_dir.path().join("backups"));

        let (layout, metadata) = prepare_run(&config, fixed_now())?;

        let snapshot_dir = temp_dir.path().join("backups").join("17.05.24");
        assert_eq!(layout.snapshot_dir, snapshot_dir);
        assert!(layout.dirs.target.ends_with("17.05.24/data"));
        assert!(layout.dirs.target.is_dir());
        // Nothing to compare against yet
        assert!(layout.dirs.comparison_is_target());
        assert_eq!(metadata.name, "17.05.24");
        assert!(!metadata.successful);
        assert_eq!(SnapshotMetadata::read(&snapshot_dir)?, metadata);
        Ok(())
    }

    #[test]
    fn test_name_collisions_get_suffixes() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let source = temp_dir.path().join("data");
        fs::create_dir(&source)?;
        let config = BackupConfig::new(&source, temp_dir.path().join("backups"));

        let (first, _) = prepare_run(&config, fixed_now())?;
        let (second, _) = prepare_run(&config, fixed_now())?;
        let (third, _) = prepare_run(&config, fixed_now())?;

        assert!(first.snapshot_dir.ends_with("17.05.24"));
        assert!(second.snapshot_dir.ends_with("17.05.24 #2"));
        assert!(third.snapshot_dir.ends_with("17.05.24 #3"));
        Ok(())
    }

    #[test]
    fn test_compares_with_last_successful_snapshot() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let source = temp_dir.path().join("data");
        fs::create_dir(&source)?;
        let mut config = BackupConfig::new(&source, temp_dir.path().join("backups"));
        config.mode = BackupMode::Hardlink;

        let (first, mut first_meta) = prepare_run(&config, fixed_now())?;
        first_meta.finish(true, 0);
        first_meta.write(&first.snapshot_dir)?;

        let (second, _) = prepare_run(&config, fixed_now() + chrono::Duration::hours(1))?;

        assert_eq!(second.dirs.comparison, first.dirs.target);
        assert!(!second.dirs.comparison_is_target());
        Ok(())
    }

    #[test]
    fn test_versioned_without_comparison_uses_own_target() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let source = temp_dir.path().join("data");
        fs::create_dir(&source)?;
        let mut config = BackupConfig::new(&source, temp_dir.path().join("backups"));
        config.compare_with_last_backup = false;

        let (first, mut first_meta) = prepare_run(&config, fixed_now())?;
        first_meta.finish(true, 0);
        first_meta.write(&first.snapshot_dir)?;
        let (second, _) = prepare_run(&config, fixed_now())?;

        assert!(second.dirs.comparison_is_target());
        Ok(())
    }

    #[test]
    fn test_unversioned_layout() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let source = temp_dir.path().join("data");
        fs::create_dir(&source)?;
        let mut config = BackupConfig::new(&source, temp_dir.path().join("mirror"));
        config.versioned = false;

        let (layout, _) = prepare_run(&config, fixed_now())?;

        assert_eq!(layout.snapshot_dir, temp_dir.path().join("mirror"));
        assert_eq!(layout.dirs.target, temp_dir.path().join("mirror"));
        assert!(layout.dirs.comparison_is_target());
        assert!(layout.bookkeeping_in_tree());
        assert!(temp_dir.path().join("mirror").join("metadata.json").is_file());
        Ok(())
    }

    #[test]
    fn test_rejects_name_with_separator() {
        let temp_dir = TempDir::new().unwrap();
        let err = create_snapshot_dir(temp_dir.path(), "2024/05").unwrap_err();
        assert!(matches!(err, BackupError::Snapshot(_)));
    }
}
