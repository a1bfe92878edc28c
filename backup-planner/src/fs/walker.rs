//! Directory traversal in collation order.
//!
//! The walker yields every file and directory below a root exactly once,
//! depth first, a directory before its children and siblings in
//! [`collate_names`](super::collate::collate_names) order. Entries that cannot
//! be read are reported as skipped instead of ending the walk.

use super::collate::{collate_os_names, SEPARATOR};
use crate::utils::errors::{BackupError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// One file or directory seen during a walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Relative path from the walk root, `/`-separated
    pub path: String,

    /// Is this a directory?
    pub is_dir: bool,
}

impl Entry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }
}

/// An entry the walker could not accept
#[derive(Debug, Clone)]
pub struct SkippedEntry {
    /// Full path of the offending entry (the root if unknown)
    pub path: PathBuf,

    /// Why it was skipped
    pub reason: String,
}

/// Result of visiting one filesystem object
#[derive(Debug, Clone)]
pub enum WalkOutcome {
    Entry(Entry),
    Excluded { path: String, pattern: String },
    Skipped(SkippedEntry),
}

/// Ordered glob patterns; the first pattern matching a relative path excludes it
#[derive(Debug, Clone)]
pub struct ExcludeFilter {
    patterns: Vec<String>,
    set: GlobSet,
}

impl ExcludeFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern.as_ref())?);
        }
        Ok(Self {
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
            set: builder.build()?,
        })
    }

    /// A filter that accepts everything
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    /// Copy of this filter with extra patterns appended
    pub fn with_patterns<S: AsRef<str>>(&self, extra: &[S]) -> Result<Self> {
        let mut patterns = self.patterns.clone();
        patterns.extend(extra.iter().map(|p| p.as_ref().to_string()));
        Self::new(&patterns)
    }

    /// First pattern matching `relative_path`, if any
    pub fn matching_pattern(&self, relative_path: &str) -> Option<&str> {
        self.set
            .matches(relative_path)
            .into_iter()
            .min()
            .map(|idx| self.patterns[idx].as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Lazy depth-first walk over a tree.
pub struct TreeWalker {
    root: PathBuf,
    inner: Option<walkdir::IntoIter>,
    filter: ExcludeFilter,
}

impl TreeWalker {
    pub fn new(root: &Path, filter: ExcludeFilter) -> Self {
        let inner = if root.exists() {
            Some(
                WalkDir::new(root)
                    .follow_links(false)
                    .min_depth(1)
                    .sort_by(|a, b| collate_os_names(a.file_name(), b.file_name()))
                    .into_iter(),
            )
        } else {
            debug!(root = %root.display(), "Walk root does not exist, treating it as empty");
            None
        };

        Self {
            root: root.to_path_buf(),
            inner,
            filter,
        }
    }

    fn visit(&mut self, entry: &DirEntry) -> WalkOutcome {
        let relative = match relative_path(&self.root, entry.path()) {
            Some(path) => path,
            None => {
                return WalkOutcome::Skipped(SkippedEntry {
                    path: entry.path().to_path_buf(),
                    reason: "path is not valid UTF-8".to_string(),
                })
            }
        };

        let file_type = entry.file_type();

        if let Some(pattern) = self.filter.matching_pattern(&relative) {
            let pattern = pattern.to_string();
            if file_type.is_dir() {
                if let Some(inner) = self.inner.as_mut() {
                    inner.skip_current_dir();
                }
            }
            return WalkOutcome::Excluded {
                path: relative,
                pattern,
            };
        }

        if file_type.is_symlink() {
            // Links are backed up as the file they point to
            return match std::fs::metadata(entry.path()) {
                Ok(resolved) if resolved.is_dir() => WalkOutcome::Skipped(SkippedEntry {
                    path: entry.path().to_path_buf(),
                    reason: "symlink to a directory".to_string(),
                }),
                Ok(_) => WalkOutcome::Entry(Entry::file(relative)),
                Err(e) => WalkOutcome::Skipped(SkippedEntry {
                    path: entry.path().to_path_buf(),
                    reason: format!("broken symlink: {}", e),
                }),
            };
        }

        WalkOutcome::Entry(Entry {
            path: relative,
            is_dir: file_type.is_dir(),
        })
    }
}

impl Iterator for TreeWalker {
    type Item = WalkOutcome;

    fn next(&mut self) -> Option<WalkOutcome> {
        let next = self.inner.as_mut()?.next()?;
        let outcome = match next {
            Ok(entry) => self.visit(&entry),
            Err(e) => WalkOutcome::Skipped(SkippedEntry {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone()),
                reason: e.to_string(),
            }),
        };

        match &outcome {
            WalkOutcome::Entry(_) => {}
            WalkOutcome::Excluded { path, pattern } => {
                debug!(path = %path, pattern = %pattern, "Excluded");
            }
            WalkOutcome::Skipped(skipped) => {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "Skipping entry");
            }
        }

        Some(outcome)
    }
}

/// Fully collected walk
#[derive(Debug, Clone, Default)]
pub struct Tree {
    /// Accepted entries in collation order
    pub entries: Vec<Entry>,

    /// Entries that could not be read
    pub skipped: Vec<SkippedEntry>,

    /// Number of paths dropped by exclude patterns (excluded directories count once)
    pub excluded: usize,
}

impl Tree {
    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_dir).count()
    }

    pub fn dir_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_dir).count()
    }
}

/// Walk a directory tree and collect every entry
///
/// # Arguments
/// * `root` - Root directory to start walking from; a missing root is an empty tree
/// * `filter` - Exclude patterns applied to relative paths
///
/// # Returns
/// * `Ok(Tree)` - Entries in collation order plus skip statistics
/// * `Err(BackupError::NotADirectory)` - If `root` exists but is not a directory
///
/// # Example
/// ```no_run
/// use backup_planner::fs::walker::{walk_tree, ExcludeFilter};
/// use std::path::Path;
///
/// let tree = walk_tree(Path::new("/data"), &ExcludeFilter::empty()).unwrap();
/// println!("Found {} entries", tree.entries.len());
/// ```
pub fn walk_tree(root: &Path, filter: &ExcludeFilter) -> Result<Tree> {
    if root.exists() && !root.is_dir() {
        return Err(BackupError::NotADirectory(root.to_path_buf()));
    }

    let mut tree = Tree::default();
    for outcome in TreeWalker::new(root, filter.clone()) {
        match outcome {
            WalkOutcome::Entry(entry) => tree.entries.push(entry),
            WalkOutcome::Excluded { .. } => tree.excluded += 1,
            WalkOutcome::Skipped(skipped) => tree.skipped.push(skipped),
        }
    }

    debug!(
        root = %root.display(),
        files = tree.file_count(),
        dirs = tree.dir_count(),
        skipped = tree.skipped.len(),
        excluded = tree.excluded,
        "Walk finished"
    );

    Ok(tree)
}

/// Relative `/`-separated form of `path` below `root`
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in relative.components() {
        if let Component::Normal(name) = component {
            if !out.is_empty() {
                out.push(SEPARATOR);
            }
            out.push_str(name.to_str()?);
        }
    }
    Some(out)
}
