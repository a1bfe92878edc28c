//! Filesystem primitives: ordered tree walks, file comparison and metadata.

pub mod collate;
pub mod compare;
pub mod metadata;
pub mod walker;
