//! Snapshot lifecycle
//!
//! Drives one backup run through `Empty -> Staging -> Populating -> Committed`.
//! The staging directory is reached in one of three ways: created empty,
//! renamed from a recycled snapshot, or resumed as left by an interrupted
//! run. Committing renames it to the run's timestamp, which is the only point
//! where a new snapshot becomes visible to the catalog.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::catalog::SnapshotCatalog;
use super::linking::{self, LinkPlan};
use super::retention::{self, RetentionDecision};
use crate::config::BackupConfig;
use crate::error::{BackupError, BackupResult};
use crate::mirror::{Mirror, MirrorRequest};
use crate::models::{Snapshot, SnapshotName, Source, SourceSet};

/// Lifecycle states of the snapshot a run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Empty,
    Staging,
    Populating,
    Committed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Staging => "staging",
            Self::Populating => "populating",
            Self::Committed => "committed",
        };
        write!(f, "{}", name)
    }
}

/// How the staging directory came to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingOrigin {
    /// Created empty
    Fresh,
    /// Renamed from an old snapshot
    Recycled(SnapshotName),
    /// Left behind by an unfinished run
    Resumed,
}

/// The in-progress snapshot directory
#[derive(Debug)]
pub struct StagingSnapshot {
    path: PathBuf,
    origin: StagingOrigin,
}

impl StagingSnapshot {
    /// Create an empty staging directory
    pub fn create(path: PathBuf) -> BackupResult<Self> {
        info!(path = %path.display(), "Creating new staging directory");
        fs::create_dir(&path).map_err(|e| {
            BackupError::Staging(format!("Failed to create {}: {}", path.display(), e))
        })?;

        Ok(Self {
            path,
            origin: StagingOrigin::Fresh,
        })
    }

    /// Reuse a staging directory left by an unfinished run, unmodified
    pub fn resume(path: PathBuf) -> Self {
        info!(path = %path.display(), "Continuing unfinished backup");
        Self {
            path,
            origin: StagingOrigin::Resumed,
        }
    }

    /// Rename an old snapshot into the staging slot
    ///
    /// With named sources every top-level entry that is not a directory
    /// named by a current source id is removed afterwards.
    pub fn recycle(path: PathBuf, snapshot: &Snapshot, sources: &SourceSet) -> BackupResult<Self> {
        info!(
            from = %snapshot.path.display(),
            to = %path.display(),
            "Recycling old backup"
        );
        fs::rename(&snapshot.path, &path).map_err(|e| {
            BackupError::Staging(format!(
                "Failed to rename {} to {}: {}",
                snapshot.path.display(),
                path.display(),
                e
            ))
        })?;

        if !sources.is_unnamed() {
            remove_stale_entries(&path, &sources.ids())?;
        }

        Ok(Self {
            path,
            origin: StagingOrigin::Recycled(snapshot.name.clone()),
        })
    }

    /// Staging directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How the directory came to be
    pub fn origin(&self) -> &StagingOrigin {
        &self.origin
    }

    /// Directory a source is mirrored into
    pub fn destination_for(&self, source: &Source) -> PathBuf {
        match source.id() {
            Some(id) => self.path.join(id),
            None => self.path.clone(),
        }
    }

    /// Rename the staging directory to its final name
    ///
    /// On failure the staging directory stays where it is.
    pub fn commit(self, root: &Path, name: SnapshotName) -> BackupResult<Snapshot> {
        let snapshot = Snapshot::new(root, name);
        let commit_error = |reason: String| BackupError::Commit {
            name: snapshot.name.to_string(),
            reason,
        };

        // rename(2) silently replaces an empty directory
        if fs::symlink_metadata(&snapshot.path).is_ok() {
            return Err(commit_error(format!(
                "{} already exists",
                snapshot.path.display()
            )));
        }

        fs::rename(&self.path, &snapshot.path).map_err(|e| commit_error(e.to_string()))?;

        info!(path = %snapshot.path.display(), "Snapshot committed");
        Ok(snapshot)
    }
}

/// Remove everything in a recycled snapshot that does not belong to a source
fn remove_stale_entries(staging: &Path, ids: &[&str]) -> BackupResult<()> {
    let staging_error = |e: std::io::Error| {
        BackupError::Staging(format!("Failed to clean {}: {}", staging.display(), e))
    };

    for entry in fs::read_dir(staging).map_err(staging_error)? {
        let entry = entry.map_err(staging_error)?;
        // DirEntry::file_type does not follow symlinks
        let file_type = entry.file_type().map_err(staging_error)?;
        let name = entry.file_name();

        let is_source_dir =
            file_type.is_dir() && name.to_str().map(|n| ids.contains(&n)).unwrap_or(false);
        if is_source_dir {
            continue;
        }

        let path = entry.path();
        info!(path = %path.display(), "Removing stale entry from recycled backup");
        if file_type.is_dir() {
            fs::remove_dir_all(&path).map_err(staging_error)?;
        } else {
            fs::remove_file(&path).map_err(staging_error)?;
        }
    }

    Ok(())
}

/// A source that failed to mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source_label: String,
    pub reason: String,
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The committed snapshot
    pub snapshot: Snapshot,
    /// Snapshots deleted by retention
    pub deleted: Vec<SnapshotName>,
    /// Snapshot recycled as staging
    pub recycled: Option<SnapshotName>,
    /// An unfinished run was continued
    pub resumed: bool,
    /// Link references used
    pub links: LinkPlan,
    /// Sources whose mirroring failed
    pub failures: Vec<SourceFailure>,
    /// Log files written by the mirroring tool
    pub mirror_logs: Vec<PathBuf>,
}

impl RunReport {
    /// True if at least one source failed to mirror
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("Created snapshot {}", self.snapshot.name)];

        if !self.deleted.is_empty() {
            parts.push(format!("deleted {} old", self.deleted.len()));
        }
        if let Some(recycled) = &self.recycled {
            parts.push(format!("recycled {}", recycled));
        }
        if self.resumed {
            parts.push("continued unfinished backup".to_string());
        }
        match &self.links.reference {
            Some(reference) => parts.push(format!("linked against {}", reference)),
            None => parts.push("full copy".to_string()),
        }
        if self.has_failures() {
            parts.push(format!("{} source(s) failed", self.failures.len()));
        }

        parts.join(", ")
    }
}

/// One source in a dry run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSource {
    pub label: String,
    pub root: PathBuf,
    /// Destination relative to the snapshot root
    pub destination: PathBuf,
    /// Link reference relative to the destination
    pub link_dest: Option<PathBuf>,
}

/// What a run would do, computed without touching the destination
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Name the snapshot would be committed as
    pub run: SnapshotName,
    pub decision: RetentionDecision,
    pub links: LinkPlan,
    pub sources: Vec<PlannedSource>,
}

/// Runs the snapshot lifecycle for a configuration
pub struct SnapshotController<'a, M: Mirror> {
    config: &'a BackupConfig,
    mirror: M,
}

impl<'a, M: Mirror> SnapshotController<'a, M> {
    /// Create a controller with an injected mirroring capability
    pub fn new(config: &'a BackupConfig, mirror: M) -> Self {
        Self { config, mirror }
    }

    /// Execute a backup run named `now`
    pub fn run(&self, now: SnapshotName) -> BackupResult<RunReport> {
        let root = self.config.paths.destination();
        let mut state = LifecycleState::Empty;

        let catalog = SnapshotCatalog::list(root)?;
        check_clock(&catalog, &now)?;
        let staging_exists = self.staging_exists()?;

        let decision = retention::plan(&catalog, self.config.keep, staging_exists);
        let deleted = retention::prune(&decision)?;

        let staging_path = self.config.paths.staging_dir();
        let staging = if staging_exists {
            StagingSnapshot::resume(staging_path)
        } else if let Some(snapshot) = &decision.recycle {
            StagingSnapshot::recycle(staging_path, snapshot, &self.config.sources)?
        } else {
            StagingSnapshot::create(staging_path)?
        };
        transition(&mut state, LifecycleState::Staging);

        // Re-list so the recycled snapshot can never be a reference
        let catalog = SnapshotCatalog::list(root)?;
        let links = linking::resolve(&catalog, &self.config.sources);

        transition(&mut state, LifecycleState::Populating);
        let mut failures = Vec::new();
        let mut mirror_logs = Vec::new();

        for source in &self.config.sources {
            let log_file = self.config.paths.mirror_log_file(&now, source);
            mirror_logs.push(log_file.clone());

            if let Err(e) = self.mirror_source(&staging, source, &links, log_file) {
                error!(source = %source.label(), "{}", e);
                failures.push(SourceFailure {
                    source_label: source.label(),
                    reason: e.to_string(),
                });
            }
        }

        let recycled = match staging.origin() {
            StagingOrigin::Recycled(name) => Some(name.clone()),
            _ => None,
        };
        let resumed = *staging.origin() == StagingOrigin::Resumed;

        let snapshot = staging.commit(root, now)?;
        transition(&mut state, LifecycleState::Committed);

        if !failures.is_empty() {
            warn!(
                failed = failures.len(),
                "Snapshot committed, but not every source was mirrored"
            );
        }

        Ok(RunReport {
            snapshot,
            deleted,
            recycled,
            resumed,
            links,
            failures,
            mirror_logs,
        })
    }

    /// Compute what `run` would do without changing anything
    pub fn preview(&self, now: SnapshotName) -> BackupResult<RunPlan> {
        let catalog = SnapshotCatalog::list(self.config.paths.destination())?;
        check_clock(&catalog, &now)?;
        let staging_exists = self.staging_exists()?;

        let decision = retention::plan(&catalog, self.config.keep, staging_exists);
        let remaining = catalog.without(decision.removed_names());
        let links = linking::resolve(&remaining, &self.config.sources);

        let sources = self
            .config
            .sources
            .iter()
            .map(|source| PlannedSource {
                label: source.label(),
                root: source.root().to_path_buf(),
                destination: source.id().map(PathBuf::from).unwrap_or_default(),
                link_dest: links.for_source(source).map(|l| l.relative.clone()),
            })
            .collect();

        Ok(RunPlan {
            run: now,
            decision,
            links,
            sources,
        })
    }

    fn staging_exists(&self) -> BackupResult<bool> {
        let path = self.config.paths.staging_dir();
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => Ok(true),
            Ok(_) => Err(BackupError::Precondition(format!(
                "{} exists but is not a directory",
                path.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BackupError::CatalogRead {
                path,
                reason: e.to_string(),
            }),
        }
    }

    fn mirror_source(
        &self,
        staging: &StagingSnapshot,
        source: &Source,
        links: &LinkPlan,
        log_file: PathBuf,
    ) -> BackupResult<()> {
        let destination = staging.destination_for(source);
        fs::create_dir_all(&destination).map_err(|e| {
            BackupError::mirror(
                source.label(),
                format!("Failed to create {}: {}", destination.display(), e),
            )
        })?;

        let request = MirrorRequest {
            source_label: source.label(),
            source_root: source.root().to_path_buf(),
            destination,
            link_dest: links.for_source(source).map(|l| l.relative.clone()),
            excludes: source.excludes().to_vec(),
            log_file,
        };

        self.mirror.mirror(&request)
    }
}

/// Refuse a run whose name would not sort after every existing snapshot
fn check_clock(catalog: &SnapshotCatalog, now: &SnapshotName) -> BackupResult<()> {
    match catalog.newest() {
        Some(newest) if newest.name >= *now => Err(BackupError::Precondition(format!(
            "Snapshot {} does not sort after the newest snapshot {}; check the system clock",
            now, newest.name
        ))),
        _ => Ok(()),
    }
}

fn transition(state: &mut LifecycleState, next: LifecycleState) {
    debug!(from = %state, to = %next, "Snapshot state change");
    *state = next;
}
