//! Custom error types for linkback
//!
//! This module defines the error hierarchy for backup runs using thiserror.
//! The variants follow the stages of a run: configuration and preconditions
//! are surfaced before anything on disk is touched, catalog, deletion and
//! staging failures abort before mirroring starts, mirror failures are
//! per-source, and commit failures leave the staging directory in place.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for linkback operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A precondition for running a backup does not hold
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The destination root could not be listed
    #[error("Failed to read snapshot catalog at {path}: {reason}")]
    CatalogRead { path: PathBuf, reason: String },

    /// An old snapshot could not be removed
    #[error("Failed to delete snapshot {name}: {reason}")]
    Deletion { name: String, reason: String },

    /// The staging directory could not be created, recycled or cleaned
    #[error("Failed to prepare staging snapshot: {0}")]
    Staging(String),

    /// The mirroring tool failed for one source
    #[error("Mirror failed for source {source_label}: {reason}")]
    Mirror { source_label: String, reason: String },

    /// The staging directory could not be renamed to its final name
    #[error("Failed to commit snapshot {name}: {reason}")]
    Commit { name: String, reason: String },

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl BackupError {
    /// Create a mirror error for a source
    pub fn mirror(source_label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Mirror {
            source_label: source_label.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error was raised before any mutation of the destination
    pub fn is_pre_mutation(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Precondition(_))
    }

    /// Process exit code for this error
    ///
    /// Grouped by run stage: 2 configuration, 3 preconditions, 4 catalog,
    /// pruning and staging, 5 commit. Everything else maps to 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Precondition(_) => 3,
            Self::CatalogRead { .. } | Self::Deletion { .. } | Self::Staging(_) => 4,
            Self::Commit { .. } => 5,
            Self::Mirror { .. } | Self::Io(_) => 1,
        }
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type alias for linkback operations
pub type BackupResult<T> = Result<T, BackupError>;
