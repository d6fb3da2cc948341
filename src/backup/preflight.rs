//! Preconditions of a backup run
//!
//! Everything here is checked before the destination is touched. Marker
//! files in the sources and the destination guard against backing up an
//! unmounted drive or writing into the wrong disk.

use std::fs::{self, File};

use tracing::{debug, info};

use crate::config::BackupConfig;
use crate::error::{BackupError, BackupResult};

/// Check every precondition, in order, stopping at the first failure
pub fn check(config: &BackupConfig) -> BackupResult<()> {
    let destination = config.paths.destination();

    for source in &config.sources {
        if !source.root().is_dir() {
            return Err(BackupError::Precondition(format!(
                "Source directory {} does not exist",
                source.root().display()
            )));
        }
    }

    if !destination.is_dir() {
        return Err(BackupError::Precondition(format!(
            "Destination directory {} does not exist",
            destination.display()
        )));
    }

    for source in &config.sources {
        if !source.check_file().is_file() {
            return Err(BackupError::Precondition(format!(
                "Source check file {} does not exist",
                source.check_file().display()
            )));
        }
    }

    let destination_check = config.paths.destination_check_file();
    if !destination_check.is_file() {
        return Err(BackupError::Precondition(format!(
            "Destination check file {} does not exist",
            destination_check.display()
        )));
    }

    for source in &config.sources {
        let check_file = source.check_file();
        File::open(&check_file).map_err(|e| {
            BackupError::Precondition(format!(
                "Source check file {} is not readable: {}",
                check_file.display(),
                e
            ))
        })?;
    }

    let probe = config.paths.write_probe_file();
    File::create(&probe)
        .and_then(|_| fs::remove_file(&probe))
        .map_err(|e| {
            BackupError::Precondition(format!(
                "Destination directory {} is not writable: {}",
                destination.display(),
                e
            ))
        })?;
    debug!(path = %probe.display(), "Destination is writable");

    config.paths.ensure_log_directories()?;

    info!(
        sources = config.sources.len(),
        destination = %destination.display(),
        "All preconditions met"
    );
    Ok(())
}
