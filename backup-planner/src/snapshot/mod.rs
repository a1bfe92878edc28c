//! Snapshot directories and their `metadata.json` records.

pub mod layout;
pub mod metadata;
pub mod selector;
