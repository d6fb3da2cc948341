//! Backup engine for linkback
//!
//! Maintains a rolling set of timestamp-named snapshot directories under a
//! destination root. Each run mirrors every source into a staging directory,
//! hard-linking unchanged files from the newest snapshot, and then commits
//! the staging directory by renaming it.
//!
//! # Architecture
//!
//! - `SnapshotCatalog`: lists the committed snapshots of a destination
//! - `retention`: decides what to delete and what to recycle
//! - `linking`: picks the link reference for every source
//! - `SnapshotController`: runs the lifecycle
//!   `Empty -> Staging -> Populating -> Committed`
//! - `preflight`: checks marker files and permissions before a run
//!
//! # Example
//!
//! ```rust,ignore
//! use linkback::backup::{preflight, SnapshotController};
//! use linkback::mirror::RsyncMirror;
//! use linkback::models::SnapshotName;
//!
//! preflight::check(&config)?;
//! let mirror = RsyncMirror::new(&config.mirror);
//! let report = SnapshotController::new(&config, mirror).run(SnapshotName::now())?;
//! println!("{}", report.summary());
//! ```

mod catalog;
pub mod lifecycle;
pub mod linking;
pub mod preflight;
pub mod retention;

pub use catalog::SnapshotCatalog;
pub use lifecycle::{
    LifecycleState, PlannedSource, RunPlan, RunReport, SnapshotController, SourceFailure,
    StagingOrigin, StagingSnapshot,
};
pub use linking::{LinkPlan, LinkReference};
pub use retention::RetentionDecision;
