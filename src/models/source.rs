//! Source model
//!
//! A source is a directory tree that gets mirrored into every snapshot.
//! A single source may stay unnamed, in which case its data sits directly in
//! the snapshot root; otherwise every source carries an id and its data sits
//! in `<snapshot>/<id>/`.

use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::{BackupError, BackupResult};

/// Name of the marker file every source root must contain
pub const SOURCE_CHECK_FILE: &str = ".backup_src_check";

/// A directory to back up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// The only source of a run, mirrored into the snapshot root
    Unnamed { root: PathBuf, excludes: Vec<String> },
    /// A source mirrored into `<snapshot>/<id>/`
    Named {
        id: String,
        root: PathBuf,
        excludes: Vec<String>,
    },
}

/// Key identifying a source within a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKey {
    Unnamed,
    Named(String),
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unnamed => write!(f, "<unnamed>"),
            Self::Named(id) => write!(f, "{}", id),
        }
    }
}

impl Source {
    /// Create an unnamed source
    pub fn unnamed(root: impl Into<PathBuf>) -> Self {
        Self::Unnamed {
            root: root.into(),
            excludes: Vec::new(),
        }
    }

    /// Create a named source
    pub fn named(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self::Named {
            id: id.into(),
            root: root.into(),
            excludes: Vec::new(),
        }
    }

    /// Builder-style helper to attach exclude patterns
    pub fn with_excludes(mut self, patterns: Vec<String>) -> Self {
        match &mut self {
            Self::Unnamed { excludes, .. } | Self::Named { excludes, .. } => *excludes = patterns,
        }
        self
    }

    /// The source id, if the source is named
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Unnamed { .. } => None,
            Self::Named { id, .. } => Some(id),
        }
    }

    /// Key of this source
    pub fn key(&self) -> SourceKey {
        match self {
            Self::Unnamed { .. } => SourceKey::Unnamed,
            Self::Named { id, .. } => SourceKey::Named(id.clone()),
        }
    }

    /// Root directory of the source
    pub fn root(&self) -> &Path {
        match self {
            Self::Unnamed { root, .. } | Self::Named { root, .. } => root,
        }
    }

    /// Exclude patterns passed to the mirroring tool
    pub fn excludes(&self) -> &[String] {
        match self {
            Self::Unnamed { excludes, .. } | Self::Named { excludes, .. } => excludes,
        }
    }

    /// Path of the marker file inside the source root
    pub fn check_file(&self) -> PathBuf {
        self.root().join(SOURCE_CHECK_FILE)
    }

    /// Human-readable label for logs
    pub fn label(&self) -> String {
        self.key().to_string()
    }

    fn push_exclude(&mut self, pattern: String) {
        match self {
            Self::Unnamed { excludes, .. } | Self::Named { excludes, .. } => excludes.push(pattern),
        }
    }
}

/// Validated, ordered set of sources for one run
///
/// Either exactly one unnamed source, or one or more named sources with
/// unique ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSet {
    sources: Vec<Source>,
}

impl SourceSet {
    /// Validate a list of sources
    pub fn new(sources: Vec<Source>) -> BackupResult<Self> {
        if sources.is_empty() {
            return Err(BackupError::Config("At least one source is required".into()));
        }

        let unnamed = sources
            .iter()
            .filter(|s| matches!(s, Source::Unnamed { .. }))
            .count();
        if unnamed > 0 && sources.len() > 1 {
            return Err(BackupError::Config(
                "Every source needs an id when more than one source is given".into(),
            ));
        }

        let mut seen = HashSet::new();
        for id in sources.iter().filter_map(Source::id) {
            validate_source_id(id)?;
            if !seen.insert(id) {
                return Err(BackupError::Config(format!(
                    "Source id \"{}\" must be unique",
                    id
                )));
            }
        }

        Ok(Self { sources })
    }

    /// Sources in declared order
    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    /// Number of sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Always false for a validated set
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// True when the set is a single unnamed source
    pub fn is_unnamed(&self) -> bool {
        matches!(self.sources.as_slice(), [Source::Unnamed { .. }])
    }

    /// Ids of the named sources
    pub fn ids(&self) -> Vec<&str> {
        self.sources.iter().filter_map(Source::id).collect()
    }

    /// Attach an exclude pattern to a source
    ///
    /// `id` must name an existing source; `None` is only accepted when the
    /// set is a single unnamed source.
    pub fn add_exclude(&mut self, id: Option<&str>, pattern: String) -> BackupResult<()> {
        match id {
            Some(id) => {
                let source = self
                    .sources
                    .iter_mut()
                    .find(|s| s.id() == Some(id))
                    .ok_or_else(|| {
                        BackupError::Config(format!(
                            "Exclude id \"{}\" was not assigned to any source",
                            id
                        ))
                    })?;
                source.push_exclude(pattern);
            }
            None => {
                if self.sources.len() > 1 {
                    return Err(BackupError::Config(format!(
                        "Exclude \"{}\" cannot be associated with any source; \
                         an id is required when using multiple sources",
                        pattern
                    )));
                }
                if !self.is_unnamed() {
                    return Err(BackupError::Config(format!(
                        "Exclude \"{}\" was not assigned an id",
                        pattern
                    )));
                }
                self.sources[0].push_exclude(pattern);
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a SourceSet {
    type Item = &'a Source;
    type IntoIter = std::slice::Iter<'a, Source>;

    fn into_iter(self) -> Self::IntoIter {
        self.sources.iter()
    }
}

/// A source id names a directory inside each snapshot, so it must be a
/// single normal path component.
fn validate_source_id(id: &str) -> BackupResult<()> {
    let mut components = Path::new(id).components();
    let valid = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !id.contains('/');

    if !valid {
        return Err(BackupError::Config(format!(
            "Source id \"{}\" must be a plain directory name",
            id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_unnamed_source() {
        let set = SourceSet::new(vec![Source::unnamed("/data")]).unwrap();
        assert!(set.is_unnamed());
        assert!(set.ids().is_empty());
        assert_eq!(set.iter().next().unwrap().key(), SourceKey::Unnamed);
    }

    #[test]
    fn test_named_sources_keep_order() {
        let set = SourceSet::new(vec![
            Source::named("WWW", "/var/www"),
            Source::named("DATA", "/data"),
        ])
        .unwrap();
        assert!(!set.is_unnamed());
        assert_eq!(set.ids(), vec!["WWW", "DATA"]);
    }

    #[test]
    fn test_empty_set_rejected() {
        assert!(matches!(
            SourceSet::new(Vec::new()),
            Err(BackupError::Config(_))
        ));
    }

    #[test]
    fn test_unnamed_mixed_with_others_rejected() {
        let result = SourceSet::new(vec![Source::unnamed("/data"), Source::named("WWW", "/www")]);
        assert!(matches!(result, Err(BackupError::Config(_))));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = SourceSet::new(vec![Source::named("A", "/a"), Source::named("A", "/b")]);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("must be unique"));
    }

    #[test]
    fn test_ids_must_be_plain_names() {
        for id in ["", ".", "..", "a/b", "/abs"] {
            let result = SourceSet::new(vec![Source::named(id, "/a")]);
            assert!(result.is_err(), "id {:?} should be rejected", id);
        }
        assert!(SourceSet::new(vec![Source::named("my.data-1", "/a")]).is_ok());
    }

    #[test]
    fn test_exclude_binding() {
        let mut set =
            SourceSet::new(vec![Source::named("A", "/a"), Source::named("B", "/b")]).unwrap();
        set.add_exclude(Some("B"), "*.tmp".into()).unwrap();

        let b = set.iter().find(|s| s.id() == Some("B")).unwrap();
        assert_eq!(b.excludes(), ["*.tmp".to_string()]);

        assert!(set.add_exclude(Some("C"), "x".into()).is_err());
        assert!(set.add_exclude(None, "x".into()).is_err());
    }

    #[test]
    fn test_unbound_exclude_needs_unnamed_source() {
        let mut unnamed = SourceSet::new(vec![Source::unnamed("/data")]).unwrap();
        unnamed.add_exclude(None, "cache/".into()).unwrap();
        assert_eq!(unnamed.iter().next().unwrap().excludes(), ["cache/".to_string()]);

        let mut named = SourceSet::new(vec![Source::named("A", "/a")]).unwrap();
        let err = named.add_exclude(None, "cache/".into()).unwrap_err();
        assert!(err.to_string().contains("was not assigned an id"));
    }

    #[test]
    fn test_check_file_path() {
        let source = Source::named("A", "/srv/a");
        assert_eq!(source.check_file(), PathBuf::from("/srv/a/.backup_src_check"));
        assert_eq!(source.label(), "A");
        assert_eq!(Source::unnamed("/x").label(), "<unnamed>");
    }
}
