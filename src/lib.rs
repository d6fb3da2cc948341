//! linkback - incremental hard-link backups with retention
//!
//! This library provides the core functionality for the linkback backup
//! tool. Every run mirrors one or more source directories into a new
//! timestamp-named snapshot under a destination root, hard-linking unchanged
//! files against the newest existing snapshot, and keeps a bounded number of
//! snapshots by deleting or recycling the oldest ones.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration loading, validation and path layout
//! - `error`: Custom error types
//! - `models`: Snapshot names, snapshots and sources
//! - `backup`: Catalog, retention, link resolution and the run lifecycle
//! - `mirror`: The mirroring capability and its rsync implementation
//! - `logging`: Subscriber setup and the log summary file
//! - `display`: Terminal formatting
//! - `cli`: Command handlers
//!
//! # Example
//!
//! ```rust,ignore
//! use linkback::backup::{preflight, SnapshotController};
//! use linkback::config::{BackupConfig, RawOptions};
//! use linkback::mirror::RsyncMirror;
//! use linkback::models::SnapshotName;
//!
//! let config = BackupConfig::from_options(RawOptions {
//!     sources: vec!["/data".into()],
//!     destination: "/mnt/backup".into(),
//!     keep: 7,
//!     ..RawOptions::default()
//! })?;
//! preflight::check(&config)?;
//! let report = SnapshotController::new(&config, RsyncMirror::new(&config.mirror))
//!     .run(SnapshotName::now())?;
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod logging;
pub mod mirror;
pub mod models;

pub use error::{BackupError, BackupResult};
