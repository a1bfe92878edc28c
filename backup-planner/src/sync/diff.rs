//! Merge-join of a source tree and a comparison tree.
//!
//! Both inputs must already be in [`collate_paths`] order, which is what
//! [`walk_tree`](crate::fs::walker::walk_tree) produces. The output is in the
//! same order and lists every path once.

use crate::fs::collate::collate_paths;
use crate::fs::walker::Entry;
use std::cmp::Ordering;
use tracing::error;

/// A path tagged with the trees it occurs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEntry {
    pub path: String,
    pub is_dir: bool,
    pub in_source: bool,
    pub in_comparison: bool,
}

impl MergedEntry {
    pub fn is_source_only(&self) -> bool {
        self.in_source && !self.in_comparison
    }

    pub fn is_comparison_only(&self) -> bool {
        !self.in_source && self.in_comparison
    }

    pub fn is_in_both(&self) -> bool {
        self.in_source && self.in_comparison
    }
}

/// A path that is a directory on one side and a file on the other
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeConflict {
    pub path: String,
    pub source_is_dir: bool,
}

/// Output of [`merge_trees`]
#[derive(Debug, Clone, Default)]
pub struct TreeDiff {
    /// Merged entries in collation order
    pub entries: Vec<MergedEntry>,

    /// Paths left out of `entries` because their types disagree
    pub conflicts: Vec<TypeConflict>,
}

impl TreeDiff {
    pub fn source_only(&self) -> impl Iterator<Item = &MergedEntry> {
        self.entries.iter().filter(|e| e.is_source_only())
    }

    pub fn comparison_only(&self) -> impl Iterator<Item = &MergedEntry> {
        self.entries.iter().filter(|e| e.is_comparison_only())
    }

    pub fn in_both(&self) -> impl Iterator<Item = &MergedEntry> {
        self.entries.iter().filter(|e| e.is_in_both())
    }
}

/// Merge two sorted entry sequences in one linear pass.
///
/// A path that is a file on one side and a directory on the other is not
/// resolved: it is logged, reported in [`TreeDiff::conflicts`] and left out of
/// the merged entries. Paths below it still merge normally.
pub fn merge_trees(source: &[Entry], comparison: &[Entry]) -> TreeDiff {
    debug_assert!(is_sorted(source), "source entries are not in collation order");
    debug_assert!(is_sorted(comparison), "comparison entries are not in collation order");

    let mut diff = TreeDiff {
        entries: Vec::with_capacity(source.len().max(comparison.len())),
        conflicts: Vec::new(),
    };
    let mut left = source.iter().peekable();
    let mut right = comparison.iter().peekable();

    loop {
        let order = match (left.peek(), right.peek()) {
            (Some(s), Some(c)) => collate_paths(&s.path, &c.path),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };

        match order {
            Ordering::Less => {
                if let Some(s) = left.next() {
                    diff.entries.push(merged(s, true, false));
                }
            }
            Ordering::Greater => {
                if let Some(c) = right.next() {
                    diff.entries.push(merged(c, false, true));
                }
            }
            Ordering::Equal => {
                if let (Some(s), Some(c)) = (left.next(), right.next()) {
                    if s.is_dir == c.is_dir {
                        diff.entries.push(merged(s, true, true));
                    } else {
                        error!(
                            path = %s.path,
                            source_is_dir = s.is_dir,
                            "Path is a directory on one side and a file on the other; leaving it alone"
                        );
                        diff.conflicts.push(TypeConflict {
                            path: s.path.clone(),
                            source_is_dir: s.is_dir,
                        });
                    }
                }
            }
        }
    }

    diff
}

fn merged(entry: &Entry, in_source: bool, in_comparison: bool) -> MergedEntry {
    MergedEntry {
        path: entry.path.clone(),
        is_dir: entry.is_dir,
        in_source,
        in_comparison,
    }
}

fn is_sorted(entries: &[Entry]) -> bool {
    entries
        .windows(2)
        .all(|pair| collate_paths(&pair[0].path, &pair[1].path) == Ordering::Less)
}
