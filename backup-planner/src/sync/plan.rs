//! Turns merged entries into an ordered action list.
//!
//! | source | comparison | action                                                     |
//! |--------|------------|------------------------------------------------------------|
//! | yes    | no         | `copy` files and empty directories                         |
//! | yes    | yes        | equal: `hardlink` in hardlink mode, else nothing; different: `copy` |
//! | no     | yes        | `delete` in mirror mode when comparing against the target  |
//!
//! Moves are not detected: a moved file is a `copy` of the new path plus, in
//! mirror mode, a `delete` of the old one.

use super::action::{Action, Reason};
use super::diff::MergedEntry;
use super::{resolve, SyncDirs};
use crate::config::BackupMode;
use crate::fs::collate::is_descendant;
use crate::fs::compare::FileComparator;
use tracing::debug;

/// Classifies merged entries for one backup mode
pub struct Planner<'a> {
    mode: BackupMode,
    comparator: &'a FileComparator,
    dirs: &'a SyncDirs,
}

impl<'a> Planner<'a> {
    pub fn new(mode: BackupMode, comparator: &'a FileComparator, dirs: &'a SyncDirs) -> Self {
        Self {
            mode,
            comparator,
            dirs,
        }
    }

    /// Mirror mode may only delete from the tree it is mutating, never from an
    /// older snapshot it merely compares against.
    fn deletes_allowed(&self) -> bool {
        self.mode == BackupMode::Mirror && self.dirs.comparison_is_target()
    }

    /// Empty directories that exist on both sides still have to be created
    /// when the target is a fresh snapshot.
    fn recreates_unchanged_dirs(&self) -> bool {
        self.mode == BackupMode::Hardlink && !self.dirs.comparison_is_target()
    }

    /// Plan actions for `entries`, which must be in collation order
    pub fn plan(&self, entries: &[MergedEntry]) -> Vec<Action> {
        let next_source = next_source_indices(entries);
        let deletes_allowed = self.deletes_allowed();
        let mut actions = Vec::new();
        let mut deleted_dir: Option<&str> = None;

        for (idx, entry) in entries.iter().enumerate() {
            if let Some(dir) = deleted_dir {
                if is_descendant(&entry.path, dir) {
                    continue;
                }
                deleted_dir = None;
            }

            let has_source_children = next_source[idx]
                .map(|next| is_descendant(&entries[next].path, &entry.path))
                .unwrap_or(false);

            let action = match (entry.in_source, entry.in_comparison) {
                (true, false) if !entry.is_dir => Some(Action::copy(&entry.path).because(Reason::New)),
                (true, false) if !has_source_children => {
                    Some(Action::copy(&entry.path).because(Reason::EmptyDir))
                }
                (true, false) => None,
                (true, true) if entry.is_dir => {
                    if self.recreates_unchanged_dirs() && !has_source_children {
                        Some(Action::copy(&entry.path).because(Reason::EmptyDir))
                    } else {
                        None
                    }
                }
                (true, true) => self.plan_existing_file(&entry.path),
                (false, true) if deletes_allowed => {
                    if entry.is_dir {
                        deleted_dir = Some(entry.path.as_str());
                    }
                    Some(Action::delete(&entry.path).because(Reason::Removed))
                }
                (false, _) => None,
            };

            match action {
                Some(action) => {
                    debug!(path = %entry.path, action = %action.kind, "Planned");
                    actions.push(action);
                }
                None => debug!(path = %entry.path, "Nothing to do"),
            }
        }

        actions
    }

    fn plan_existing_file(&self, path: &str) -> Option<Action> {
        let equal = self.comparator.files_eq(
            &resolve(&self.dirs.source, path),
            &resolve(&self.dirs.comparison, path),
        );

        match (equal, self.mode) {
            (true, BackupMode::Hardlink) => Some(Action::hardlink(path).because(Reason::Unchanged)),
            (true, _) => None,
            (false, _) => Some(Action::copy(path).because(Reason::Changed)),
        }
    }
}

/// For every index, the index of the next entry present in the source
fn next_source_indices(entries: &[MergedEntry]) -> Vec<Option<usize>> {
    let mut next = vec![None; entries.len()];
    let mut upcoming = None;
    for idx in (0..entries.len()).rev() {
        next[idx] = upcoming;
        if entries[idx].in_source {
            upcoming = Some(idx);
        }
    }
    next
}
