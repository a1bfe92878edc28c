//! Equality of two files that sit at the same relative path.
//!
//! Criteria are checked in the configured order and the first disagreement
//! decides. An I/O failure never escapes: the pair is treated as different so
//! the file gets copied again rather than silently skipped.

use crate::config::CompareMethod;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use tracing::warn;

/// Read size for byte-for-byte comparison
const COMPARE_CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of comparing two files
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    /// Every criterion agreed
    Equal,
    /// The named criterion disagreed
    Different(CompareMethod),
    /// Stat-ing or reading one of the files failed
    Failed(String),
}

impl Comparison {
    /// Failures count as different.
    pub fn is_equal(&self) -> bool {
        matches!(self, Comparison::Equal)
    }
}

/// Compares files under an ordered list of criteria
#[derive(Debug, Clone)]
pub struct FileComparator {
    methods: Vec<CompareMethod>,
}

impl FileComparator {
    pub fn new(methods: Vec<CompareMethod>) -> Self {
        Self { methods }
    }

    pub fn methods(&self) -> &[CompareMethod] {
        &self.methods
    }

    /// Compare `a` and `b`, logging failures
    pub fn compare(&self, a: &Path, b: &Path) -> Comparison {
        match self.try_compare(a, b) {
            Ok(Some(method)) => Comparison::Different(method),
            Ok(None) => Comparison::Equal,
            Err(e) => {
                warn!(
                    left = %a.display(),
                    right = %b.display(),
                    error = %e,
                    "Comparing files failed, treating them as different"
                );
                Comparison::Failed(e.to_string())
            }
        }
    }

    /// True iff `a` and `b` agree under every criterion
    pub fn files_eq(&self, a: &Path, b: &Path) -> bool {
        self.compare(a, b).is_equal()
    }

    /// First disagreeing criterion, if any
    fn try_compare(&self, a: &Path, b: &Path) -> io::Result<Option<CompareMethod>> {
        let a_meta = fs::metadata(a)?;
        let b_meta = fs::metadata(b)?;

        for &method in &self.methods {
            let equal = match method {
                CompareMethod::Moddate => a_meta.modified()? == b_meta.modified()?,
                CompareMethod::Size => a_meta.len() == b_meta.len(),
                CompareMethod::Bytes => {
                    a_meta.len() == b_meta.len() && contents_equal(a, b)?
                }
            };
            if !equal {
                return Ok(Some(method));
            }
        }

        Ok(None)
    }
}

/// Byte-for-byte comparison, stopping at the first differing chunk
fn contents_equal(a: &Path, b: &Path) -> io::Result<bool> {
    let mut left = File::open(a)?;
    let mut right = File::open(b)?;
    let mut left_buf = vec![0u8; COMPARE_CHUNK_SIZE];
    let mut right_buf = vec![0u8; COMPARE_CHUNK_SIZE];

    loop {
        let n = read_full(&mut left, &mut left_buf)?;
        let m = read_full(&mut right, &mut right_buf)?;
        if n != m || left_buf[..n] != right_buf[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the reader allows; short only at end of file
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    fn write_with_mtime(path: &Path, content: &[u8], secs: i64) -> io::Result<()> {
        fs::write(path, content)?;
        set_file_mtime(path, FileTime::from_unix_time(secs, 0))
    }

    #[test]
    fn test_size_ignores_mtime() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        write_with_mtime(&a, b"same", 1_000)?;
        write_with_mtime(&b, b"same", 2_000)?;

        let comparator = FileComparator::new(vec![CompareMethod::Size]);
        assert!(comparator.files_eq(&a, &b));

        let comparator = FileComparator::new(vec![CompareMethod::Moddate]);
        assert_eq!(comparator.compare(&a, &b), Comparison::Different(CompareMethod::Moddate));
        Ok(())
    }

    #[test]
    fn test_size_change_detected_regardless_of_mtime() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        write_with_mtime(&a, b"short", 1_000)?;
        write_with_mtime(&b, b"longer content", 1_000)?;

        let comparator = FileComparator::new(vec![CompareMethod::Moddate, CompareMethod::Size]);
        assert_eq!(comparator.compare(&a, &b), Comparison::Different(CompareMethod::Size));
        Ok(())
    }

    #[test]
    fn test_bytes_detects_same_size_edit() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        write_with_mtime(&a, b"hello world", 1_000)?;
        write_with_mtime(&b, b"hello World", 1_000)?;

        let comparator = FileComparator::new(vec![
            CompareMethod::Moddate,
            CompareMethod::Size,
            CompareMethod::Bytes,
        ]);
        assert_eq!(comparator.compare(&a, &b), Comparison::Different(CompareMethod::Bytes));
        Ok(())
    }

    #[test]
    fn test_bytes_across_chunks() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");

        let data = vec![b'A'; COMPARE_CHUNK_SIZE * 3 + 17];
        let mut changed = data.clone();
        changed[COMPARE_CHUNK_SIZE * 2 + 5] = b'B';
        fs::write(&a, &data)?;
        fs::write(&b, &data)?;

        let comparator = FileComparator::new(vec![CompareMethod::Bytes]);
        assert!(comparator.files_eq(&a, &b));

        fs::write(&b, &changed)?;
        assert!(!comparator.files_eq(&a, &b));
        Ok(())
    }

    #[test]
    fn test_missing_file_counts_as_different() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let a = temp_dir.path().join("a");
        fs::write(&a, b"data")?;

        let comparator = FileComparator::new(vec![CompareMethod::Size]);
        let result = comparator.compare(&a, &temp_dir.path().join("vanished"));

        assert!(matches!(result, Comparison::Failed(_)));
        assert!(!result.is_equal());
        Ok(())
    }
}
