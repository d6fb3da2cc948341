//! Retention planning
//!
//! Decides which snapshots fall out of the retention window and whether the
//! oldest survivor can be recycled as the next staging directory instead of
//! being deleted and recreated.
//!
//! A staging directory left by an interrupted run occupies one slot of the
//! window: once committed it becomes a snapshot like any other.

use std::fs;

use tracing::{info, warn};

use super::catalog::SnapshotCatalog;
use crate::error::{BackupError, BackupResult};
use crate::models::{Snapshot, SnapshotName};

/// What to do with existing snapshots before a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionDecision {
    /// Snapshots to delete, oldest first
    pub to_delete: Vec<Snapshot>,
    /// Snapshot to rename into the staging slot
    pub recycle: Option<Snapshot>,
    /// Number of committed snapshots kept besides the new one (None = unlimited)
    pub effective_keep: Option<usize>,
    /// A staging directory from an unfinished run was found
    pub resumes_staging: bool,
}

impl RetentionDecision {
    /// Names of the snapshots to delete
    pub fn deleted_names(&self) -> Vec<&SnapshotName> {
        self.to_delete.iter().map(|s| &s.name).collect()
    }

    /// Names of every snapshot that leaves the catalog (deleted or recycled)
    pub fn removed_names(&self) -> Vec<&SnapshotName> {
        self.to_delete
            .iter()
            .chain(self.recycle.iter())
            .map(|s| &s.name)
            .collect()
    }

    /// True if the decision changes nothing on disk
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty() && self.recycle.is_none()
    }
}

/// Plan deletions and recycling for a catalog
///
/// `keep == 0` keeps everything. Otherwise the oldest snapshots beyond the
/// window are deleted and, when no staging directory exists, the oldest
/// survivor is recycled if the window is exactly full.
pub fn plan(catalog: &SnapshotCatalog, keep: usize, staging_exists: bool) -> RetentionDecision {
    if keep == 0 {
        return RetentionDecision {
            resumes_staging: staging_exists,
            ..RetentionDecision::default()
        };
    }

    let mut effective_keep = keep;
    if staging_exists {
        warn!("Last backup was not finished. Continuing.");
        effective_keep -= 1;
    }

    // Catalog order is ascending by name, so the prefix is the oldest
    let snapshots = catalog.snapshots();
    let excess = snapshots.len().saturating_sub(effective_keep);
    let (to_delete, remaining) = snapshots.split_at(excess);

    let recycle = if !staging_exists && remaining.len() == effective_keep {
        remaining.first().cloned()
    } else {
        None
    };

    RetentionDecision {
        to_delete: to_delete.to_vec(),
        recycle,
        effective_keep: Some(effective_keep),
        resumes_staging: staging_exists,
    }
}

/// Delete the snapshots a decision marks, oldest first
///
/// Stops at the first failure; nothing is retried.
pub fn prune(decision: &RetentionDecision) -> BackupResult<Vec<SnapshotName>> {
    let mut deleted = Vec::with_capacity(decision.to_delete.len());

    for snapshot in &decision.to_delete {
        info!(path = %snapshot.path.display(), "Deleting old backup");
        fs::remove_dir_all(&snapshot.path).map_err(|e| BackupError::Deletion {
            name: snapshot.name.to_string(),
            reason: e.to_string(),
        })?;
        deleted.push(snapshot.name.clone());
    }

    Ok(deleted)
}
