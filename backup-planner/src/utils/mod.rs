//! Utility modules for the backup planner.

pub mod errors;
pub mod logger;

pub use errors::{BackupError, Result};
