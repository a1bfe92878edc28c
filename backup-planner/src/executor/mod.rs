//! Plan executor - replays an action list against the filesystem.
//!
//! Every action is attempted in order. A failing action is logged with its
//! path and type, recorded in the [`ExecutionReport`], and execution moves on;
//! one missing or locked file never aborts a run.

pub mod manifest;

use crate::config::SuccessPolicy;
use crate::fs::metadata::copy_with_metadata;
use crate::sync::action::{Action, ActionKind};
use crate::sync::{resolve, SyncDirs};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What a successful action did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    CopiedFile(u64),
    CreatedDir,
    Deleted,
    Linked,
}

/// An action that raised an I/O error
#[derive(Debug, Clone)]
pub struct FailedAction {
    pub kind: ActionKind,
    pub name: String,
    pub error: String,
}

/// Execution result
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub total_actions: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedAction>,
    /// Reserved or unknown kinds that were not executed
    pub skipped: usize,
    pub copied_files: usize,
    pub copied_bytes: u64,
    pub created_dirs: usize,
    pub linked_files: usize,
    pub deleted_entries: usize,
    pub duration_secs: u64,
}

impl ExecutionReport {
    /// Every action was attempted
    pub fn completed(&self) -> bool {
        self.succeeded + self.failed.len() + self.skipped == self.total_actions
    }

    /// Completed without a single failed action
    pub fn is_clean(&self) -> bool {
        self.completed() && self.failed.is_empty()
    }

    /// Whether the run counts as successful under `policy`
    pub fn satisfies(&self, policy: SuccessPolicy) -> bool {
        match policy {
            SuccessPolicy::Completed => self.completed(),
            SuccessPolicy::NoFailures => self.is_clean(),
        }
    }

    fn record(&mut self, applied: Applied) {
        self.succeeded += 1;
        match applied {
            Applied::CopiedFile(bytes) => {
                self.copied_files += 1;
                self.copied_bytes += bytes;
            }
            Applied::CreatedDir => self.created_dirs += 1,
            Applied::Deleted => self.deleted_entries += 1,
            Applied::Linked => self.linked_files += 1,
        }
    }
}

/// Applies actions to the target tree of one run
pub struct ActionExecutor {
    dirs: SyncDirs,
}

impl ActionExecutor {
    pub fn new(dirs: SyncDirs) -> Self {
        Self { dirs }
    }

    /// Apply every action in order
    pub fn execute(&self, actions: &[Action]) -> ExecutionReport {
        let start_time = Instant::now();
        let mut report = ExecutionReport {
            total_actions: actions.len(),
            ..Default::default()
        };

        info!(
            "Executing {} actions into {}",
            actions.len(),
            self.dirs.target.display()
        );

        for action in actions {
            match action.kind {
                ActionKind::Rename | ActionKind::Hardlink2 => {
                    warn!(action = %action.kind, path = %action.name(), "Move detection actions are not supported, skipping");
                    report.skipped += 1;
                    continue;
                }
                ActionKind::Unknown => {
                    error!(path = %action.name(), "Unknown action type, skipping");
                    report.skipped += 1;
                    continue;
                }
                _ => {}
            }

            match self.apply(action) {
                Ok(applied) => {
                    debug!(action = %action.kind, path = %action.name(), "Applied");
                    report.record(applied);
                }
                Err(e) => {
                    error!(action = %action.kind, path = %action.name(), error = %e, "Action failed");
                    report.failed.push(FailedAction {
                        kind: action.kind,
                        name: action.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report.duration_secs = start_time.elapsed().as_secs();

        info!(
            "Execution finished: {} succeeded, {} failed, {} skipped ({} files / {} bytes copied, {} linked, {} deleted), {}s",
            report.succeeded,
            report.failed.len(),
            report.skipped,
            report.copied_files,
            report.copied_bytes,
            report.linked_files,
            report.deleted_entries,
            report.duration_secs
        );

        report
    }

    fn apply(&self, action: &Action) -> io::Result<Applied> {
        let name = action.name();
        match action.kind {
            ActionKind::Copy => self.copy(name),
            ActionKind::Delete => self.delete(name),
            ActionKind::Hardlink => self.hardlink(name),
            kind => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{} cannot be executed", kind),
            )),
        }
    }

    fn copy(&self, name: &str) -> io::Result<Applied> {
        let from = resolve(&self.dirs.source, name);
        let to = resolve(&self.dirs.target, name);

        if fs::metadata(&from)?.is_dir() {
            fs::create_dir_all(&to)?;
            return Ok(Applied::CreatedDir);
        }

        ensure_parent(&to)?;
        // Unlink first so data hardlinked into an older snapshot is never overwritten
        match fs::symlink_metadata(&to) {
            Ok(existing) if !existing.is_dir() => fs::remove_file(&to)?,
            _ => {}
        }
        let bytes = copy_with_metadata(&from, &to)?;
        Ok(Applied::CopiedFile(bytes))
    }

    fn delete(&self, name: &str) -> io::Result<Applied> {
        let path = resolve(&self.dirs.target, name);
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Already deleted");
                return Ok(Applied::Deleted);
            }
            Err(e) => return Err(e),
        };
        if metadata.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        Ok(Applied::Deleted)
    }

    fn hardlink(&self, name: &str) -> io::Result<Applied> {
        let existing = resolve(&self.dirs.comparison, name);
        let link = resolve(&self.dirs.target, name);

        match fs::symlink_metadata(&link) {
            Ok(current) if !current.is_dir() => {
                if same_file(&existing, &link)? {
                    debug!(path = %link.display(), "Already linked");
                    return Ok(Applied::Linked);
                }
                fs::remove_file(&link)?;
            }
            _ => ensure_parent(&link)?,
        }
        fs::hard_link(&existing, &link)?;
        Ok(Applied::Linked)
    }
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

/// Both paths name the same inode
#[cfg(unix)]
fn same_file(a: &Path, b: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let (a, b) = (fs::metadata(a)?, fs::metadata(b)?);
    Ok(a.dev() == b.dev() && a.ino() == b.ino())
}

#[cfg(not(unix))]
fn same_file(_a: &Path, _b: &Path) -> io::Result<bool> {
    Ok(false)
}
