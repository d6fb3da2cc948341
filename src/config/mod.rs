//! Configuration module for linkback
//!
//! This module provides configuration management including:
//! - Destination and log path layout
//! - Parsing and validation of sources, excludes and retention
//! - JSON settings files

pub mod paths;
pub mod settings;

pub use paths::BackupPaths;
pub use settings::{BackupConfig, MirrorSettings, RawOptions};
