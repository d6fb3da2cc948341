//! Snapshot model
//!
//! A snapshot is a committed backup directory named after the moment its run
//! started. The fixed-width name format makes lexicographic order equal to
//! chronological order, so snapshots are compared by name only.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::BackupError;

/// strftime format of snapshot directory names
pub const SNAPSHOT_NAME_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// Length of every valid snapshot name
const SNAPSHOT_NAME_LEN: usize = 19;

/// Validated snapshot name ("YYYY-MM-DD_HH:MM:SS")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SnapshotName(String);

impl SnapshotName {
    /// Parse a directory name, returning None if it is not a snapshot name
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != SNAPSHOT_NAME_LEN {
            return None;
        }

        let datetime = NaiveDateTime::parse_from_str(s, SNAPSHOT_NAME_FORMAT).ok()?;

        // chrono accepts unpadded fields; only the canonical spelling is a name
        if datetime.format(SNAPSHOT_NAME_FORMAT).to_string() != s {
            return None;
        }

        Some(Self(s.to_string()))
    }

    /// Build a name from a local date and time (sub-second precision is dropped)
    pub fn from_datetime(datetime: NaiveDateTime) -> Self {
        Self(datetime.format(SNAPSHOT_NAME_FORMAT).to_string())
    }

    /// Name for a run starting now, in local time
    pub fn now() -> Self {
        Self::from_datetime(Local::now().naive_local())
    }

    /// The name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The date and time encoded in the name
    pub fn datetime(&self) -> NaiveDateTime {
        // Construction guarantees the format
        NaiveDateTime::parse_from_str(&self.0, SNAPSHOT_NAME_FORMAT)
            .unwrap_or(NaiveDateTime::MIN)
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SnapshotName {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            BackupError::Config(format!(
                "'{}' is not a snapshot name (expected YYYY-MM-DD_HH:MM:SS)",
                s
            ))
        })
    }
}

impl TryFrom<String> for SnapshotName {
    type Error = BackupError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SnapshotName> for String {
    fn from(name: SnapshotName) -> Self {
        name.0
    }
}

impl AsRef<Path> for SnapshotName {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// A committed snapshot directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Directory name
    pub name: SnapshotName,
    /// Full path to the directory
    pub path: PathBuf,
}

impl Snapshot {
    /// Create a snapshot located directly under `root`
    pub fn new(root: &Path, name: SnapshotName) -> Self {
        let path = root.join(&name);
        Self { name, path }
    }

    /// Directory holding the data of a named source inside this snapshot
    pub fn source_dir(&self, source_id: &str) -> PathBuf {
        self.path.join(source_id)
    }

    /// Names of the per-source subdirectories present in this snapshot
    pub fn source_dirs(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.path) else {
            return Vec::new();
        };

        let mut dirs: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        dirs.sort();
        dirs
    }
}
