//! Logging setup for linkback
//!
//! Every message goes through `tracing`. [`init`] installs a subscriber with
//! a human-readable layer on stderr. Backup runs use [`init_with_run_log`],
//! which adds a second plain-text layer for the run's log file. The filter
//! honors `RUST_LOG` and defaults to `info`, or `debug` with `--verbose`.

mod summary;

pub use summary::LogSummary;

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::{BackupError, BackupResult};

/// Install the global subscriber, logging to stderr only
pub fn init(verbose: bool) -> BackupResult<()> {
    install(verbose, None)
}

/// Install the global subscriber with a run log layer
///
/// Nothing is written to disk until [`RunLog::attach`] is called, so a run
/// that fails its preconditions leaves the log directory alone.
pub fn init_with_run_log(verbose: bool) -> BackupResult<RunLog> {
    let run_log = RunLog::pending();
    install(verbose, Some(run_log.clone()))?;
    Ok(run_log)
}

fn install(verbose: bool, run_log: Option<RunLog>) -> BackupResult<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = run_log.map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .with(filter)
        .try_init()
        .map_err(|e| BackupError::Io(format!("Failed to initialize logging: {}", e)))
}

enum Sink {
    /// Lines logged before the file is known
    Pending(Vec<u8>),
    File(File),
}

/// Thread-safe writer for the run log
///
/// Buffers in memory until attached to a file, then appends.
#[derive(Clone)]
pub struct RunLog {
    sink: Arc<Mutex<Sink>>,
}

impl RunLog {
    fn pending() -> Self {
        Self {
            sink: Arc::new(Mutex::new(Sink::Pending(Vec::new()))),
        }
    }

    /// Start writing to `path`, flushing everything logged so far
    ///
    /// The parent directory must already exist.
    pub fn attach(&self, path: &Path) -> BackupResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                BackupError::Precondition(format!(
                    "Failed to open log file {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let mut sink = self.lock()?;
        if let Sink::Pending(buffered) = &*sink {
            file.write_all(buffered)?;
        }
        *sink = Sink::File(file);
        Ok(())
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, Sink>> {
        self.sink
            .lock()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

impl Write for RunLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut *self.lock()? {
            Sink::Pending(buffered) => {
                buffered.extend_from_slice(buf);
                Ok(buf.len())
            }
            Sink::File(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut *self.lock()? {
            Sink::Pending(_) => Ok(()),
            Sink::File(file) => file.flush(),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RunLog {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_log_buffers_until_attached() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("logs");
        let mut run_log = RunLog::pending();

        run_log.write_all(b"started\n").unwrap();
        run_log.flush().unwrap();
        assert!(!log_dir.exists());

        std::fs::create_dir(&log_dir).unwrap();
        let path = log_dir.join("run.log");
        run_log.attach(&path).unwrap();
        run_log.write_all(b"finished\n").unwrap();
        run_log.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "started\nfinished\n");
    }

    #[test]
    fn test_run_log_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run.log");
        std::fs::write(&path, "first\n").unwrap();

        let mut run_log = RunLog::pending();
        run_log.attach(&path).unwrap();
        run_log.write_all(b"second\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_attach_does_not_create_directories() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");

        let result = RunLog::pending().attach(&missing.join("run.log"));

        assert!(matches!(result, Err(BackupError::Precondition(_))));
        assert!(!missing.exists());
    }

    #[test]
    fn test_clones_share_one_sink() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run.log");
        let run_log = RunLog::pending();
        let mut writer = run_log.clone();

        writer.write_all(b"from a layer\n").unwrap();
        run_log.attach(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "from a layer\n");
    }
}
