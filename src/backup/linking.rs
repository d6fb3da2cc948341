//! Link reference resolution
//!
//! The mirroring tool hard-links unchanged files from a reference snapshot.
//! One reference is chosen per run, the newest committed snapshot, and each
//! source gets a path into it relative to its own destination directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::catalog::SnapshotCatalog;
use crate::models::{SnapshotName, Source, SourceKey, SourceSet};

/// Where a source's unchanged files are linked from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReference {
    /// Path relative to the source's destination inside the staging snapshot
    pub relative: PathBuf,
}

/// Link references for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPlan {
    /// Snapshot every reference points into
    pub reference: Option<SnapshotName>,
    links: HashMap<SourceKey, LinkReference>,
}

impl LinkPlan {
    /// Reference for a source, None for a full copy
    pub fn for_source(&self, source: &Source) -> Option<&LinkReference> {
        self.links.get(&source.key())
    }
}

/// Pick the reference snapshot and a per-source link path
///
/// Read-only apart from existence checks. A source whose directory is
/// missing from the reference snapshot is copied in full.
pub fn resolve(catalog: &SnapshotCatalog, sources: &SourceSet) -> LinkPlan {
    let Some(reference) = catalog.newest() else {
        debug!("No previous snapshot, every source is copied in full");
        return LinkPlan::default();
    };

    let mut links = HashMap::new();

    for source in sources {
        let (relative, absolute) = match source.id() {
            None => (
                Path::new("..").join(&reference.name),
                reference.path.clone(),
            ),
            Some(id) => (
                Path::new("../..").join(&reference.name).join(id),
                reference.source_dir(id),
            ),
        };

        if !absolute.is_dir() {
            warn!(
                source = %source.label(),
                path = %absolute.display(),
                "Link destination does not exist. Maybe the source id changed? \
                 Copying without hard links"
            );
            continue;
        }

        debug!(source = %source.label(), link_dest = %relative.display(), "Resolved link reference");
        links.insert(source.key(), LinkReference { relative });
    }

    LinkPlan {
        reference: Some(reference.name.clone()),
        links,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const OLDER: &str = "2024-01-01_00:00:00";
    const NEWER: &str = "2024-01-02_00:00:00";

    fn destination(subdirs: &[&str]) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        for name in [OLDER, NEWER] {
            fs::create_dir(temp_dir.path().join(name)).unwrap();
            for sub in subdirs {
                fs::create_dir(temp_dir.path().join(name).join(sub)).unwrap();
            }
        }
        temp_dir
    }

    fn named(ids: &[&str]) -> SourceSet {
        SourceSet::new(
            ids.iter()
                .map(|id| Source::named(*id, format!("/src/{}", id)))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_catalog_has_no_reference() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = SnapshotCatalog::list(temp_dir.path()).unwrap();
        let sources = named(&["A", "B"]);

        let plan = resolve(&catalog, &sources);

        assert!(plan.reference.is_none());
        for source in &sources {
            assert!(plan.for_source(source).is_none());
        }
    }

    #[test]
    fn test_unnamed_source_links_one_level_up() {
        let temp_dir = destination(&[]);
        let catalog = SnapshotCatalog::list(temp_dir.path()).unwrap();
        let sources = SourceSet::new(vec![Source::unnamed("/data")]).unwrap();

        let plan = resolve(&catalog, &sources);
        let link = plan.for_source(sources.iter().next().unwrap()).unwrap();

        assert_eq!(plan.reference.as_ref().unwrap().as_str(), NEWER);
        assert_eq!(link.relative, PathBuf::from("../2024-01-02_00:00:00"));
    }

    #[test]
    fn test_named_sources_link_two_levels_up() {
        let temp_dir = destination(&["A", "B"]);
        let catalog = SnapshotCatalog::list(temp_dir.path()).unwrap();
        let sources = named(&["A", "B"]);

        let plan = resolve(&catalog, &sources);
        let mut iter = sources.iter();
        let a = plan.for_source(iter.next().unwrap()).unwrap();
        let b = plan.for_source(iter.next().unwrap()).unwrap();

        assert_eq!(a.relative, PathBuf::from("../../2024-01-02_00:00:00/A"));
        assert_eq!(b.relative, PathBuf::from("../../2024-01-02_00:00:00/B"));
    }

    #[test]
    fn test_new_source_id_is_copied_in_full() {
        let temp_dir = destination(&["A"]);
        let catalog = SnapshotCatalog::list(temp_dir.path()).unwrap();
        let sources = named(&["A", "RENAMED"]);

        let plan = resolve(&catalog, &sources);
        let mut iter = sources.iter();

        assert!(plan.for_source(iter.next().unwrap()).is_some());
        assert!(plan.for_source(iter.next().unwrap()).is_none());
        assert_eq!(plan.reference.as_ref().unwrap().as_str(), NEWER);
    }

    #[test]
    fn test_reduced_catalog_skips_removed_snapshots() {
        let temp_dir = destination(&[]);
        let catalog = SnapshotCatalog::list(temp_dir.path()).unwrap();
        let newest = SnapshotName::parse(NEWER).unwrap();
        let sources = SourceSet::new(vec![Source::unnamed("/data")]).unwrap();

        let plan = resolve(&catalog.without([&newest]), &sources);

        assert_eq!(plan.reference.as_ref().unwrap().as_str(), OLDER);
    }
}
