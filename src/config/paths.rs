//! Path management for linkback
//!
//! Names every path a backup run touches: the destination root with its
//! snapshot and staging directories and marker file, and the log directory
//! with per-run and per-source log files.
//!
//! ## Destination layout
//!
//! ```text
//! <destination>/
//!   .backup_dst_check          marker supplied by the user
//!   tmp_partial_backup/        staging snapshot of an unfinished run
//!   2024-01-02_03:04:05/       committed snapshot (unnamed source)
//!   2024-01-03_03:04:05/DATA/  committed snapshot, per-source data
//! ```

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{BackupError, BackupResult};
use crate::models::{SnapshotName, Source};

/// Reserved name of the staging snapshot directory
pub const STAGING_DIR_NAME: &str = "tmp_partial_backup";

/// Name of the marker file the destination root must contain
pub const DESTINATION_CHECK_FILE: &str = ".backup_dst_check";

/// Temporary file used to probe write access to the destination
pub const WRITE_PROBE_FILE: &str = ".linkback_write_probe";

/// Default log directory (relative to the working directory)
pub const DEFAULT_LOG_DIR: &str = "log-files";

/// File name of the log summary inside the log directory
pub const DEFAULT_LOG_SUMMARY_NAME: &str = "latest_log_files.txt";

/// Manages all paths used by a backup run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPaths {
    /// Destination root holding the snapshots
    destination: PathBuf,
    /// Directory for run and mirror log files
    log_dir: PathBuf,
    /// File listing the log files of the latest run
    log_summary: PathBuf,
}

impl BackupPaths {
    /// Create paths with the default log summary location
    pub fn new(destination: PathBuf, log_dir: PathBuf) -> Self {
        let log_summary = log_dir.join(DEFAULT_LOG_SUMMARY_NAME);
        Self {
            destination,
            log_dir,
            log_summary,
        }
    }

    /// Override the log summary location
    pub fn with_log_summary(mut self, log_summary: PathBuf) -> Self {
        self.log_summary = log_summary;
        self
    }

    /// Get the destination root
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Get the staging snapshot directory
    pub fn staging_dir(&self) -> PathBuf {
        self.destination.join(STAGING_DIR_NAME)
    }

    /// Get the destination marker file
    pub fn destination_check_file(&self) -> PathBuf {
        self.destination.join(DESTINATION_CHECK_FILE)
    }

    /// Get the write probe file
    pub fn write_probe_file(&self) -> PathBuf {
        self.destination.join(WRITE_PROBE_FILE)
    }

    /// Get the log directory
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Get the log summary file
    pub fn log_summary(&self) -> &Path {
        &self.log_summary
    }

    /// Get the log file of a whole run
    pub fn run_log_file(&self, run: &SnapshotName) -> PathBuf {
        self.log_dir.join(format!("{}_linkback.log", run))
    }

    /// Get the log file the mirroring tool writes for one source
    pub fn mirror_log_file(&self, run: &SnapshotName, source: &Source) -> PathBuf {
        match source.id() {
            Some(id) => self.log_dir.join(format!("{}_{}_rsync.log", run, id)),
            None => self.log_dir.join(format!("{}_rsync.log", run)),
        }
    }

    /// Ensure the log directory and the log summary's parent exist
    pub fn ensure_log_directories(&self) -> BackupResult<()> {
        std::fs::create_dir_all(&self.log_dir).map_err(|e| {
            BackupError::Precondition(format!(
                "Failed to create log directory {}: {}",
                self.log_dir.display(),
                e
            ))
        })?;

        if let Some(parent) = self.log_summary.parent().filter(|p| !p.as_os_str().is_empty()) {
            if parent.exists() && !parent.is_dir() {
                return Err(BackupError::Precondition(format!(
                    "Cannot create directory for log summary: {} exists and is not a directory",
                    parent.display()
                )));
            }
            std::fs::create_dir_all(parent).map_err(|e| {
                BackupError::Precondition(format!(
                    "Failed to create directory for log summary {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }
}

/// Append the machine's fully qualified host name to a destination
pub fn host_qualified(destination: &Path) -> BackupResult<PathBuf> {
    Ok(destination.join(resolve_fqdn()?))
}

/// Resolve the fully qualified host name
///
/// Asks `hostname -f` first and falls back to `/etc/hostname`.
pub fn resolve_fqdn() -> BackupResult<String> {
    let from_command = Command::new("hostname")
        .arg("-f")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|name| !name.is_empty());

    if let Some(name) = from_command {
        return Ok(name);
    }

    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|contents| contents.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| BackupError::Config("Could not determine the host name".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn run_name() -> SnapshotName {
        SnapshotName::parse("2024-05-06_07:08:09").unwrap()
    }

    #[test]
    fn test_destination_paths() {
        let paths = BackupPaths::new(PathBuf::from("/backup"), PathBuf::from("logs"));

        assert_eq!(paths.staging_dir(), PathBuf::from("/backup/tmp_partial_backup"));
        assert_eq!(
            paths.destination_check_file(),
            PathBuf::from("/backup/.backup_dst_check")
        );
    }

    #[test]
    fn test_log_file_names() {
        let paths = BackupPaths::new(PathBuf::from("/backup"), PathBuf::from("logs"));

        assert_eq!(
            paths.log_summary(),
            Path::new("logs/latest_log_files.txt")
        );
        assert_eq!(
            paths.run_log_file(&run_name()),
            PathBuf::from("logs/2024-05-06_07:08:09_linkback.log")
        );
        assert_eq!(
            paths.mirror_log_file(&run_name(), &Source::unnamed("/data")),
            PathBuf::from("logs/2024-05-06_07:08:09_rsync.log")
        );
        assert_eq!(
            paths.mirror_log_file(&run_name(), &Source::named("WWW", "/var/www")),
            PathBuf::from("logs/2024-05-06_07:08:09_WWW_rsync.log")
        );
    }

    #[test]
    fn test_ensure_log_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = BackupPaths::new(
            PathBuf::from("/backup"),
            temp_dir.path().join("logs").join("nested"),
        )
        .with_log_summary(temp_dir.path().join("summary").join("latest.txt"));

        paths.ensure_log_directories().unwrap();

        assert!(temp_dir.path().join("logs/nested").is_dir());
        assert!(temp_dir.path().join("summary").is_dir());
    }

    #[test]
    fn test_log_summary_parent_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("blocker"), "x").unwrap();

        let paths = BackupPaths::new(PathBuf::from("/backup"), temp_dir.path().join("logs"))
            .with_log_summary(temp_dir.path().join("blocker").join("latest.txt"));

        let err = paths.ensure_log_directories().unwrap_err();
        assert!(matches!(err, BackupError::Precondition(_)));
    }
}
