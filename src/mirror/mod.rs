//! Mirroring capability for linkback
//!
//! The backup core never copies files itself. It hands a typed
//! [`MirrorRequest`] per source to an injected [`Mirror`], which performs a
//! recursive copy with delete-extraneous semantics, optionally hard-linking
//! unchanged files from a reference snapshot.
//!
//! # Implementations
//!
//! - `RsyncMirror`: runs `rsync` (or a compatible program) as a child
//!   process, forwards its output to the log and enforces an optional
//!   timeout.

mod rsync;

pub use rsync::RsyncMirror;

use std::path::PathBuf;

use crate::error::BackupResult;

/// Everything the mirroring tool needs to populate one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRequest {
    /// Label of the source for logs and errors
    pub source_label: String,
    /// Directory whose contents are mirrored
    pub source_root: PathBuf,
    /// Directory inside the staging snapshot to mirror into
    pub destination: PathBuf,
    /// Reference directory for hard links, relative to `destination`
    pub link_dest: Option<PathBuf>,
    /// Exclude patterns
    pub excludes: Vec<String>,
    /// File the tool writes its own log to
    pub log_file: PathBuf,
}

/// Populates a directory from a source tree
pub trait Mirror {
    /// Mirror one source
    ///
    /// Returns `BackupError::Mirror` when the tool cannot be started, exits
    /// unsuccessfully or times out.
    fn mirror(&self, request: &MirrorRequest) -> BackupResult<()>;
}

impl<M: Mirror + ?Sized> Mirror for &M {
    fn mirror(&self, request: &MirrorRequest) -> BackupResult<()> {
        (**self).mirror(request)
    }
}
