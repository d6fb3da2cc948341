//! Log summary file
//!
//! After every run the summary file is rewritten to list the log files the
//! run produced, one absolute path per line, so scripts can pick up the
//! latest logs without knowing the timestamp.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{BackupError, BackupResult};

/// Writes the list of log files of the latest run
pub struct LogSummary {
    /// Path to the summary file
    path: PathBuf,
}

impl LogSummary {
    /// Create a summary writer for the given file
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path to the summary file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the summary with the given log files
    ///
    /// Relative paths are made absolute against the working directory.
    pub fn write(&self, log_files: &[PathBuf]) -> BackupResult<()> {
        let file = File::create(&self.path)
            .map_err(|e| BackupError::Io(format!("Failed to create log summary: {}", e)))?;
        let mut writer = BufWriter::new(file);

        info!("The following log files were created:");
        for log_file in log_files {
            let absolute = absolute(log_file);
            info!("  {}", absolute.display());
            writeln!(writer, "{}", absolute.display())
                .map_err(|e| BackupError::Io(format!("Failed to write log summary: {}", e)))?;
        }

        writer
            .flush()
            .map_err(|e| BackupError::Io(format!("Failed to flush log summary: {}", e)))?;

        Ok(())
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
