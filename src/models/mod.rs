//! Core data models for linkback
//!
//! This module contains the data structures shared by the backup core:
//! snapshot names and directories, and the sources mirrored into them.

pub mod snapshot;
pub mod source;

pub use snapshot::{Snapshot, SnapshotName, SNAPSHOT_NAME_FORMAT};
pub use source::{Source, SourceKey, SourceSet, SOURCE_CHECK_FILE};
