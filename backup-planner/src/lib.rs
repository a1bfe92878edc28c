//! Backup Planner Library
//!
//! Diff-and-plan backup engine: compares a source tree with a comparison tree,
//! turns the differences into an ordered list of copy, delete and hardlink
//! actions, and executes them into plain or versioned (optionally hardlinked)
//! snapshot directories.

pub mod backup;
pub mod config;
pub mod executor;
pub mod fs;
pub mod snapshot;
pub mod sync;
pub mod utils;

// Re-export commonly used types
pub use config::BackupConfig;
pub use utils::errors::{BackupError, Result};
