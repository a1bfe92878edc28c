//! One backup run from configuration to finished snapshot.
//!
//! 1. [`plan`]: create the snapshot directory, walk source and comparison
//!    trees concurrently, merge them and classify every path.
//! 2. [`execute`]: apply the action list to the target tree.
//! 3. [`run`]: both of the above plus `actions.json` and the final
//!    `metadata.json` record.
//!
//! Filesystem work happens on the blocking thread pool; the async surface only
//! sequences the phases.

use crate::config::{BackupConfig, SuccessPolicy};
use crate::executor::manifest::{read_actions, write_actions, ACTIONS_FILENAME};
use crate::executor::{ActionExecutor, ExecutionReport};
use crate::fs::compare::FileComparator;
use crate::fs::walker::{walk_tree, ExcludeFilter};
use crate::snapshot::layout::{prepare_run, RunLayout};
use crate::snapshot::metadata::{SnapshotMetadata, METADATA_FILENAME};
use crate::sync::action::{count_by_kind, Action};
use crate::sync::diff::{merge_trees, TypeConflict};
use crate::sync::plan::Planner;
use crate::sync::SyncDirs;
use crate::utils::errors::Result;
use crate::utils::logger::{LogHandle, LOG_FILENAME};
use chrono::Local;
use std::path::Path;
use tokio::task;
use tracing::{info, warn};

/// A planned but not yet executed run
#[derive(Debug, Clone)]
pub struct PlannedRun {
    pub layout: RunLayout,
    pub metadata: SnapshotMetadata,
    pub actions: Vec<Action>,
    /// Paths skipped because they are a file on one side and a directory on the other
    pub conflicts: Vec<TypeConflict>,
}

impl PlannedRun {
    /// One-line histogram such as `copy: 3, delete: 1`
    pub fn summary(&self) -> String {
        if self.actions.is_empty() {
            return "no actions".to_string();
        }
        count_by_kind(&self.actions)
            .iter()
            .map(|(kind, count)| format!("{}: {}", kind, count))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Result of [`run`]
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub planned: PlannedRun,
    /// `None` for dry runs
    pub report: Option<ExecutionReport>,
}

impl RunOutcome {
    pub fn successful(&self) -> bool {
        self.planned.metadata.successful
    }
}

/// Set up the snapshot and compute its action list.
///
/// The configuration is validated and the exclude patterns compiled before
/// anything is created on disk. With a `log` handle, the rest of the run is
/// also written to `log.txt` in the snapshot directory.
pub async fn plan(config: &BackupConfig, log: Option<&LogHandle>) -> Result<PlannedRun> {
    let mut config = config.clone();
    config.validate()?;

    let mut filter = ExcludeFilter::new(&config.exclude_paths)?;
    if !config.is_versioned() {
        // Bookkeeping files share the target root with the mirrored tree
        let tmp_record = format!("{}.tmp", METADATA_FILENAME);
        filter = filter.with_patterns(&[
            METADATA_FILENAME,
            ACTIONS_FILENAME,
            LOG_FILENAME,
            tmp_record.as_str(),
        ])?;
    }

    let run_config = config.clone();
    let (layout, metadata) = task::spawn_blocking(move || prepare_run(&run_config, Local::now())).await??;
    if let Some(log) = log {
        attach_log(log, &layout.snapshot_dir);
    }

    let source_walk = task::spawn_blocking({
        let root = layout.dirs.source.clone();
        let filter = filter.clone();
        move || walk_tree(&root, &filter)
    });
    let comparison_walk = task::spawn_blocking({
        let root = layout.dirs.comparison.clone();
        move || walk_tree(&root, &filter)
    });
    let (source_tree, comparison_tree) = tokio::try_join!(source_walk, comparison_walk)?;
    let (source_tree, comparison_tree) = (source_tree?, comparison_tree?);

    info!(
        files = source_tree.file_count(),
        dirs = source_tree.dir_count(),
        excluded = source_tree.excluded,
        "Source enumerated"
    );
    info!(
        files = comparison_tree.file_count(),
        dirs = comparison_tree.dir_count(),
        "Comparison enumerated"
    );
    let unreadable = source_tree.skipped.len() + comparison_tree.skipped.len();
    if unreadable > 0 {
        warn!("{} entries could not be read and were left out", unreadable);
    }

    let mode = config.mode;
    let comparator = FileComparator::new(config.compare_method.clone());
    let dirs = layout.dirs.clone();
    let (actions, conflicts) = task::spawn_blocking(move || {
        let diff = merge_trees(&source_tree.entries, &comparison_tree.entries);
        let actions = Planner::new(mode, &comparator, &dirs).plan(&diff.entries);
        (actions, diff.conflicts)
    })
    .await?;

    let planned = PlannedRun {
        layout,
        metadata,
        actions,
        conflicts,
    };
    info!(mode = %mode, "Planned {} actions ({})", planned.actions.len(), planned.summary());
    if !planned.conflicts.is_empty() {
        warn!("{} paths changed between file and directory and were left alone", planned.conflicts.len());
    }

    Ok(planned)
}

/// Apply `actions` on the blocking pool
pub async fn execute(dirs: SyncDirs, actions: Vec<Action>) -> Result<ExecutionReport> {
    let report = task::spawn_blocking(move || ActionExecutor::new(dirs).execute(&actions)).await?;
    Ok(report)
}

/// Plan, persist, execute and record one backup run
pub async fn run(config: &BackupConfig, log: Option<&LogHandle>) -> Result<RunOutcome> {
    let mut planned = plan(config, log).await?;

    if config.save_action_file {
        write_actions(&planned.layout.snapshot_dir, &planned.actions)?;
        info!(
            "Saved actions to {}",
            planned.layout.snapshot_dir.join(ACTIONS_FILENAME).display()
        );
    }

    if !config.apply_actions {
        info!("Dry run, actions were not applied");
        return Ok(RunOutcome {
            planned,
            report: None,
        });
    }

    let report = execute(planned.layout.dirs.clone(), planned.actions.clone()).await?;
    let successful = report.satisfies(config.success_policy);
    planned.metadata.finish(successful, report.failed.len());
    planned.metadata.write(&planned.layout.snapshot_dir)?;

    if successful {
        info!(snapshot = %planned.metadata.name, "Backup finished successfully");
    } else {
        warn!(
            snapshot = %planned.metadata.name,
            failed = report.failed.len(),
            "Backup finished with failures and is not used as a future comparison base"
        );
    }

    Ok(RunOutcome {
        planned,
        report: Some(report),
    })
}

/// Execute the `actions.json` saved in `snapshot_dir` and update its record.
///
/// Replaying the same snapshot again is harmless: links that already exist
/// are kept and deletes of missing entries succeed.
pub async fn apply_snapshot(
    snapshot_dir: &Path,
    policy: SuccessPolicy,
    log: Option<&LogHandle>,
) -> Result<(SnapshotMetadata, ExecutionReport)> {
    let mut metadata = SnapshotMetadata::read(snapshot_dir)?;
    let actions = read_actions(snapshot_dir)?;
    if let Some(log) = log {
        attach_log(log, snapshot_dir);
    }
    info!(
        snapshot = %metadata.name,
        "Applying {} saved actions",
        actions.len()
    );

    let report = execute(metadata.dirs.clone(), actions).await?;
    metadata.finish(report.satisfies(policy), report.failed.len());
    metadata.write(snapshot_dir)?;

    Ok((metadata, report))
}

fn attach_log(log: &LogHandle, snapshot_dir: &Path) {
    match log.attach(snapshot_dir) {
        Ok(()) => info!(log = %snapshot_dir.join(LOG_FILENAME).display(), "Logging into snapshot"),
        Err(e) => warn!(snapshot = %snapshot_dir.display(), error = %e, "Failed to open snapshot log"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackupMode;
    use crate::sync::action::ActionKind;
    use crate::BackupError;
    use std::collections::BTreeSet;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) -> io::Result<()> {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
    }

    fn relative_tree(root: &Path) -> BTreeSet<String> {
        walkdir::WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                e.path()
                    .strip_prefix(root)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect()
    }

    fn source_fixture(temp_dir: &TempDir) -> io::Result<PathBuf> {
        let source = temp_dir.path().join("data");
        write(&source, "a.txt", "alpha")?;
        write(&source, "sub/b.txt", "beta")?;
        fs::create_dir_all(source.join("empty"))?;
        Ok(source)
    }

    #[tokio::test]
    async fn test_first_versioned_run_copies_everything() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let source = source_fixture(&temp_dir)?;
        let config = BackupConfig::new(&source, temp_dir.path().join("backups"));

        let outcome = run(&config, None).await?;

        assert!(outcome.successful());
        let report = outcome.report.as_ref().map(|r| (r.is_clean(), r.copied_files));
        assert_eq!(report, Some((true, 2)));

        let snapshot_dir = &outcome.planned.layout.snapshot_dir;
        assert_eq!(relative_tree(&snapshot_dir.join("data")), relative_tree(&source));
        assert!(snapshot_dir.join(METADATA_FILENAME).is_file());
        assert_eq!(read_actions(snapshot_dir)?, outcome.planned.actions);
        assert!(SnapshotMetadata::read(snapshot_dir)?.successful);
        Ok(())
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_hardlink_runs_share_unchanged_files() -> Result<()> {
        use std::os::unix::fs::MetadataExt;

        let temp_dir = TempDir::new()?;
        let source = source_fixture(&temp_dir)?;
        let mut config = BackupConfig::new(&source, temp_dir.path().join("backups"));
        config.mode = BackupMode::Hardlink;

        let first = run(&config, None).await?;
        write(&source, "a.txt", "alpha, but longer")?;
        let second = run(&config, None).await?;

        assert!(second.successful());
        let first_target = &first.planned.layout.dirs.target;
        let second_target = &second.planned.layout.dirs.target;
        assert_eq!(&second.planned.layout.dirs.comparison, first_target);
        assert_eq!(relative_tree(second_target), relative_tree(&source));

        let kinds: Vec<(ActionKind, &str)> = second
            .planned
            .actions
            .iter()
            .map(|a| (a.kind, a.name()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ActionKind::Copy, "a.txt"),
                (ActionKind::Copy, "empty"),
                (ActionKind::Hardlink, "sub/b.txt"),
            ]
        );

        let inode = |p: PathBuf| fs::metadata(p).map(|m| m.ino());
        assert_eq!(inode(first_target.join("sub/b.txt"))?, inode(second_target.join("sub/b.txt"))?);
        assert_ne!(inode(first_target.join("a.txt"))?, inode(second_target.join("a.txt"))?);
        assert_eq!(fs::read_to_string(first_target.join("a.txt"))?, "alpha");
        Ok(())
    }

    #[tokio::test]
    async fn test_unversioned_mirror_is_exact_and_idempotent() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let source = source_fixture(&temp_dir)?;
        let target = temp_dir.path().join("mirror");
        write(&target, "stale.txt", "old")?;
        write(&target, "stale-dir/inner.txt", "old")?;
        write(&target, LOG_FILENAME, "previous run\n")?;
        let mut config = BackupConfig::new(&source, &target);
        config.mode = BackupMode::Mirror;
        config.versioned = false;

        let first = run(&config, None).await?;
        assert!(first.successful());

        let mut expected = relative_tree(&source);
        expected.insert(METADATA_FILENAME.to_string());
        expected.insert(ACTIONS_FILENAME.to_string());
        expected.insert(LOG_FILENAME.to_string());
        assert_eq!(relative_tree(&target), expected);

        let second = run(&config, None).await?;
        assert!(second.planned.actions.is_empty());
        assert_eq!(relative_tree(&target), expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_mode_keeps_extra_files() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let source = source_fixture(&temp_dir)?;
        let target = temp_dir.path().join("plain");
        write(&target, "keep.txt", "mine")?;
        let mut config = BackupConfig::new(&source, &target);
        config.versioned = false;

        run(&config, None).await?;

        assert!(target.join("keep.txt").is_file());
        assert!(target.join("sub/b.txt").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn test_exclusions_apply_to_both_trees() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let source = source_fixture(&temp_dir)?;
        write(&source, "cache/big.bin", "xxxx")?;
        let target = temp_dir.path().join("mirror");
        write(&target, "cache/kept.bin", "target only")?;
        let mut config = BackupConfig::new(&source, &target);
        config.mode = BackupMode::Mirror;
        config.versioned = false;
        config.exclude_paths = vec!["cache".to_string()];

        let outcome = run(&config, None).await?;

        assert!(outcome.planned.actions.iter().all(|a| !a.name().starts_with("cache")));
        assert!(target.join("cache/kept.bin").is_file());
        assert!(!target.join("cache/big.bin").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_config_leaves_no_trace() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let source = source_fixture(&temp_dir)?;
        let backups = temp_dir.path().join("backups");

        let mut bad_glob = BackupConfig::new(&source, &backups);
        bad_glob.exclude_paths = vec!["a[".to_string()];
        let err = run(&bad_glob, None).await.unwrap_err();
        assert!(matches!(err, BackupError::Pattern(_)));

        let mut no_methods = BackupConfig::new(&source, &backups);
        no_methods.mode = BackupMode::Hardlink;
        no_methods.compare_method = Vec::new();
        let err = plan(&no_methods, None).await.unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));

        assert!(!backups.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_dry_run_then_apply() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let source = source_fixture(&temp_dir)?;
        let mut config = BackupConfig::new(&source, temp_dir.path().join("backups"));
        config.apply_actions = false;

        let outcome = run(&config, None).await?;
        let snapshot_dir = outcome.planned.layout.snapshot_dir.clone();
        let target = outcome.planned.layout.dirs.target.clone();

        assert!(outcome.report.is_none());
        assert!(!outcome.successful());
        assert!(relative_tree(&target).is_empty());
        assert!(snapshot_dir.join(ACTIONS_FILENAME).is_file());

        let (metadata, report) = apply_snapshot(&snapshot_dir, SuccessPolicy::Completed, None).await?;

        assert!(metadata.successful);
        assert!(report.is_clean());
        assert_eq!(relative_tree(&target), relative_tree(&source));
        Ok(())
    }

    #[tokio::test]
    async fn test_replaying_a_finished_snapshot_is_clean() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let source = source_fixture(&temp_dir)?;
        let mut config = BackupConfig::new(&source, temp_dir.path().join("backups"));
        config.mode = BackupMode::Hardlink;

        run(&config, None).await?;
        let second = run(&config, None).await?;
        let snapshot_dir = &second.planned.layout.snapshot_dir;
        assert!(second.planned.actions.iter().any(|a| a.kind == ActionKind::Hardlink));

        for _ in 0..2 {
            let (metadata, report) = apply_snapshot(snapshot_dir, SuccessPolicy::NoFailures, None).await?;
            assert!(report.failed.is_empty(), "{:?}", report.failed);
            assert!(metadata.successful);
        }
        assert_eq!(relative_tree(&second.planned.layout.dirs.target), relative_tree(&source));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_snapshot_is_not_a_comparison_base() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let source = source_fixture(&temp_dir)?;
        let mut config = BackupConfig::new(&source, temp_dir.path().join("backups"));
        config.mode = BackupMode::Hardlink;

        let good = run(&config, None).await?;

        let mut dry = config.clone();
        dry.apply_actions = false;
        run(&dry, None).await?;

        let third = run(&config, None).await?;
        assert_eq!(third.planned.layout.dirs.comparison, good.planned.layout.dirs.target);
        Ok(())
    }
}
