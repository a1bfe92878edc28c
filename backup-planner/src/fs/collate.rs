//! Collation order shared by the tree walker and the tree differ.
//!
//! Names are ordered case-insensitively first, then by their exact text, so the
//! order is total and does not depend on how a platform lists a directory.
//! Relative paths compare component by component with a parent sorting
//! before its children, which is exactly the order of a depth-first walk
//! whose siblings are sorted with [`collate_names`]. The merge-join relies
//! on that equivalence.

use std::cmp::Ordering;
use std::ffi::OsStr;

/// Separator used in every relative path handed around by the planner.
pub const SEPARATOR: char = '/';

/// Compare two file names.
pub fn collate_names(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}

/// [`collate_names`] for raw OS names, as handed out by `walkdir`.
pub fn collate_os_names(a: &OsStr, b: &OsStr) -> Ordering {
    collate_names(&a.to_string_lossy(), &b.to_string_lossy())
}

/// Compare two `/`-separated relative paths.
pub fn collate_paths(a: &str, b: &str) -> Ordering {
    let mut left = a.split(SEPARATOR);
    let mut right = b.split(SEPARATOR);
    loop {
        match (left.next(), right.next()) {
            (Some(x), Some(y)) => match collate_names(x, y) {
                Ordering::Equal => continue,
                other => return other,
            },
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        }
    }
}

/// True if `path` lies strictly below `dir`.
pub fn is_descendant(path: &str, dir: &str) -> bool {
    path.len() > dir.len()
        && path.starts_with(dir)
        && path[dir.len()..].starts_with(SEPARATOR)
}
