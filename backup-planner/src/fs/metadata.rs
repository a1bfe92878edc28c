//! File metadata carried over when a file is copied into a snapshot.
//!
//! Modification times must survive the copy: the next run compares the
//! source against the snapshot with `moddate`, and a fresh mtime would make
//! every file look changed.

use filetime::FileTime;
use std::fs;
use std::path::Path;

/// Timestamps and permissions of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,

    /// Last access time
    pub accessed: FileTime,

    /// Last modification time
    pub modified: FileTime,

    /// File permissions (Unix mode bits)
    pub permissions: Option<u32>,
}

impl FileMetadata {
    /// Extract metadata from a file path
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;

        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };

        #[cfg(not(unix))]
        let permissions = None;

        Ok(Self {
            size: metadata.len(),
            accessed: FileTime::from_last_access_time(&metadata),
            modified: FileTime::from_last_modification_time(&metadata),
            permissions,
        })
    }

    /// Apply timestamps (and permissions where supported) to a file
    pub fn apply_to_path(&self, path: &Path) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = self.permissions {
                fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
            }
        }

        filetime::set_file_times(path, self.accessed, self.modified)
    }
}

/// Copy a regular file with its content, timestamps and permissions.
///
/// Returns the number of bytes copied.
pub fn copy_with_metadata(from: &Path, to: &Path) -> std::io::Result<u64> {
    let metadata = FileMetadata::from_path(from)?;
    let bytes = fs::copy(from, to)?;
    metadata.apply_to_path(to)?;
    Ok(bytes)
}
