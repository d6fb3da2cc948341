//! Snapshot catalog
//!
//! Lists the committed snapshots under a destination root. Only directories
//! whose name is a valid snapshot name count; the staging directory, marker
//! files and anything else a user may have put there are ignored.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BackupError, BackupResult};
use crate::models::{Snapshot, SnapshotName};

/// Committed snapshots of a destination, ascending by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotCatalog {
    root: PathBuf,
    snapshots: Vec<Snapshot>,
}

impl SnapshotCatalog {
    /// List the snapshots under `root`
    ///
    /// Read-only. Fails with `CatalogRead` if the root cannot be listed.
    pub fn list(root: &Path) -> BackupResult<Self> {
        let catalog_error = |e: std::io::Error| BackupError::CatalogRead {
            path: root.to_path_buf(),
            reason: e.to_string(),
        };

        let mut snapshots = Vec::new();

        for entry in fs::read_dir(root).map_err(catalog_error)? {
            let entry = entry.map_err(catalog_error)?;
            let path = entry.path();

            // Reserved and foreign names (including non-UTF-8) fail to parse
            let Some(name) = entry.file_name().to_str().and_then(SnapshotName::parse) else {
                continue;
            };

            if !path.is_dir() {
                debug!(path = %path.display(), "Ignoring non-directory with snapshot name");
                continue;
            }

            snapshots.push(Snapshot { name, path });
        }

        Ok(Self::from_snapshots(root.to_path_buf(), snapshots))
    }

    /// Build a catalog from already known snapshots
    pub fn from_snapshots(root: PathBuf, mut snapshots: Vec<Snapshot>) -> Self {
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots.dedup_by(|a, b| a.name == b.name);
        Self { root, snapshots }
    }

    /// Destination root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshots, oldest first
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Snapshot names, oldest first
    pub fn names(&self) -> Vec<&SnapshotName> {
        self.snapshots.iter().map(|s| &s.name).collect()
    }

    /// Number of snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// True if there are no snapshots
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Most recent snapshot (greatest name)
    pub fn newest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    /// Oldest snapshot (smallest name)
    pub fn oldest(&self) -> Option<&Snapshot> {
        self.snapshots.first()
    }

    /// A copy of this catalog without the given snapshots
    pub fn without<'a>(&self, names: impl IntoIterator<Item = &'a SnapshotName>) -> Self {
        let removed: Vec<&SnapshotName> = names.into_iter().collect();
        Self {
            root: self.root.clone(),
            snapshots: self
                .snapshots
                .iter()
                .filter(|s| !removed.contains(&&s.name))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn name(s: &str) -> SnapshotName {
        SnapshotName::parse(s).unwrap()
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for dir in [
            "2024-01-03_00:00:00",
            "2024-01-01_00:00:00",
            "tmp_partial_backup",
            "2024-01-02_00:00:00",
            "not-a-snapshot",
            "2024-1-4_00:00:00",
        ] {
            fs::create_dir(root.join(dir)).unwrap();
        }
        fs::write(root.join(".backup_dst_check"), "").unwrap();
        fs::write(root.join("2024-01-05_00:00:00"), "a file, not a snapshot").unwrap();

        let catalog = SnapshotCatalog::list(root).unwrap();

        let names: Vec<&str> = catalog.names().iter().map(|n| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "2024-01-01_00:00:00",
                "2024-01-02_00:00:00",
                "2024-01-03_00:00:00"
            ]
        );
        assert_eq!(catalog.oldest().unwrap().name, name("2024-01-01_00:00:00"));
        assert_eq!(catalog.newest().unwrap().name, name("2024-01-03_00:00:00"));
        assert_eq!(
            catalog.newest().unwrap().path,
            root.join("2024-01-03_00:00:00")
        );
    }

    #[test]
    fn test_list_empty_root() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = SnapshotCatalog::list(temp_dir.path()).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.newest().is_none());
    }

    #[test]
    fn test_list_missing_root_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");

        let err = SnapshotCatalog::list(&missing).unwrap_err();
        assert!(matches!(err, BackupError::CatalogRead { ref path, .. } if *path == missing));
    }

    #[test]
    fn test_from_snapshots_sorts() {
        let root = PathBuf::from("/backup");
        let catalog = SnapshotCatalog::from_snapshots(
            root.clone(),
            vec![
                Snapshot::new(&root, name("2024-02-01_00:00:00")),
                Snapshot::new(&root, name("2024-01-01_00:00:00")),
            ],
        );
        assert_eq!(catalog.oldest().unwrap().name, name("2024-01-01_00:00:00"));
        assert_eq!(catalog.newest().unwrap().name, name("2024-02-01_00:00:00"));
    }

    #[test]
    fn test_without() {
        let root = PathBuf::from("/backup");
        let catalog = SnapshotCatalog::from_snapshots(
            root.clone(),
            vec![
                Snapshot::new(&root, name("2024-01-01_00:00:00")),
                Snapshot::new(&root, name("2024-01-02_00:00:00")),
                Snapshot::new(&root, name("2024-01-03_00:00:00")),
            ],
        );

        let removed = name("2024-01-02_00:00:00");
        let reduced = catalog.without([&removed]);
        assert_eq!(reduced.len(), 2);
        assert!(reduced.snapshots().iter().all(|s| s.name != removed));
        assert_eq!(catalog.len(), 3);
    }
}
