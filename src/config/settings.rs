//! Backup settings for linkback
//!
//! Builds the immutable [`BackupConfig`] a run is executed with, either from
//! command-line style options or from a JSON settings file. Both paths share
//! the same validation, so a config value that exists is always consistent:
//! sources are well-formed, ids are unique and every exclude is bound to a
//! source.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::paths::{host_qualified, BackupPaths, DEFAULT_LOG_DIR};
use crate::error::{BackupError, BackupResult};
use crate::models::{Source, SourceSet};

/// Separator between an id and a path in `--src` / `--exclude` values
pub const PAIR_SEPARATOR: &str = "~#~";

/// Default mirroring program
pub const DEFAULT_MIRROR_PROGRAM: &str = "rsync";

/// How the external mirroring tool is invoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSettings {
    /// Program to execute (looked up in PATH when relative)
    pub program: PathBuf,
    /// Kill the program after this long; None waits forever
    pub timeout: Option<Duration>,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_MIRROR_PROGRAM),
            timeout: None,
        }
    }
}

/// Validated configuration of one backup run
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Sources in declared order
    pub sources: SourceSet,
    /// Number of snapshots to keep (0 = unlimited)
    pub keep: usize,
    /// Destination and log paths
    pub paths: BackupPaths,
    /// Mirroring tool settings
    pub mirror: MirrorSettings,
}

/// Unvalidated options as given on the command line
#[derive(Debug, Clone, Default)]
pub struct RawOptions {
    /// `<path>` or `<id>~#~<path>` values
    pub sources: Vec<String>,
    /// Destination root before host qualification
    pub destination: PathBuf,
    /// Number of snapshots to keep
    pub keep: usize,
    /// `<pattern>` or `<id>~#~<pattern>` values
    pub excludes: Vec<String>,
    /// Append the host name to the destination
    pub append_hostname: bool,
    /// Log directory override
    pub log_dir: Option<PathBuf>,
    /// Log summary file override
    pub log_summary: Option<PathBuf>,
    /// Mirroring program override
    pub mirror_program: Option<PathBuf>,
    /// Mirroring timeout
    pub mirror_timeout: Option<Duration>,
}

impl BackupConfig {
    /// Build a config from command-line style options
    pub fn from_options(options: RawOptions) -> BackupResult<Self> {
        let mut sources = parse_sources(&options.sources)?;

        for exclude in &options.excludes {
            match split_pair(exclude, "exclude")? {
                Some((id, pattern)) => sources.add_exclude(Some(&id), pattern)?,
                None => sources.add_exclude(None, exclude.clone())?,
            }
        }

        let mirror = MirrorSettings {
            program: options
                .mirror_program
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MIRROR_PROGRAM)),
            timeout: options.mirror_timeout,
        };

        Self::assemble(
            sources,
            &options.destination,
            options.append_hostname,
            options.keep,
            options.log_dir,
            options.log_summary,
            mirror,
        )
    }

    /// Load a config from a JSON settings file
    pub fn load(path: &Path) -> BackupResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BackupError::Config(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: ConfigFile = serde_json::from_str(&contents).map_err(|e| {
            BackupError::Config(format!(
                "Failed to parse settings file {}: {}",
                path.display(),
                e
            ))
        })?;

        file.into_config()
    }

    fn assemble(
        sources: SourceSet,
        destination: &Path,
        append_hostname: bool,
        keep: usize,
        log_dir: Option<PathBuf>,
        log_summary: Option<PathBuf>,
        mirror: MirrorSettings,
    ) -> BackupResult<Self> {
        if destination.as_os_str().is_empty() {
            return Err(BackupError::Config("A destination is required".into()));
        }

        let destination = if append_hostname {
            host_qualified(destination)?
        } else {
            destination.to_path_buf()
        };

        let mut paths = BackupPaths::new(
            destination,
            log_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
        );
        if let Some(summary) = log_summary {
            paths = paths.with_log_summary(summary);
        }

        Ok(Self {
            sources,
            keep,
            paths,
            mirror,
        })
    }
}

/// JSON settings file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Sources in backup order
    pub sources: Vec<SourceEntry>,

    /// Destination root
    pub destination: PathBuf,

    /// Number of snapshots to keep (0 = unlimited)
    #[serde(default)]
    pub keep: usize,

    /// Append the host name to the destination
    #[serde(default = "default_append_hostname")]
    pub append_hostname: bool,

    /// Directory for log files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// File listing the log files of the latest run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_summary: Option<PathBuf>,

    /// Mirroring tool settings
    #[serde(default)]
    pub mirror: MirrorEntry,
}

/// One source in the settings file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceEntry {
    /// Source id; may be omitted for a single source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Source root directory
    pub path: PathBuf,

    /// Exclude patterns for this source
    #[serde(default)]
    pub excludes: Vec<String>,
}

/// Mirroring tool section of the settings file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorEntry {
    /// Program to execute
    #[serde(default = "default_mirror_program")]
    pub program: PathBuf,

    /// Timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for MirrorEntry {
    fn default() -> Self {
        Self {
            program: default_mirror_program(),
            timeout_secs: None,
        }
    }
}

fn default_append_hostname() -> bool {
    true
}

fn default_mirror_program() -> PathBuf {
    PathBuf::from(DEFAULT_MIRROR_PROGRAM)
}

impl ConfigFile {
    /// Validate the file contents into a config
    pub fn into_config(self) -> BackupResult<BackupConfig> {
        let sources = self
            .sources
            .into_iter()
            .map(|entry| {
                let source = match entry.id {
                    Some(id) => Source::named(id, entry.path),
                    None => Source::unnamed(entry.path),
                };
                source.with_excludes(entry.excludes)
            })
            .collect();
        let sources = SourceSet::new(sources)?;

        let mirror = MirrorSettings {
            program: self.mirror.program,
            timeout: self.mirror.timeout_secs.map(Duration::from_secs),
        };

        BackupConfig::assemble(
            sources,
            &self.destination,
            self.append_hostname,
            self.keep,
            self.log_dir,
            self.log_summary,
            mirror,
        )
    }
}

/// Split an `<id>~#~<value>` pair
///
/// Returns None when the argument contains no separator.
fn split_pair(argument: &str, what: &str) -> BackupResult<Option<(String, String)>> {
    if !argument.contains(PAIR_SEPARATOR) {
        return Ok(None);
    }

    let parts: Vec<&str> = argument.split(PAIR_SEPARATOR).collect();
    match parts.as_slice() {
        [id, value] if !id.is_empty() && !value.is_empty() => {
            Ok(Some((id.to_string(), value.to_string())))
        }
        _ => Err(BackupError::Config(format!(
            "Invalid key{}value pair for {}: \"{}\"",
            PAIR_SEPARATOR, what, argument
        ))),
    }
}

fn parse_sources(arguments: &[String]) -> BackupResult<SourceSet> {
    let sources = match arguments {
        [] => Vec::new(),
        [single] => match split_pair(single, "source")? {
            Some((id, path)) => vec![Source::named(id, path)],
            None => vec![Source::unnamed(single)],
        },
        many => many
            .iter()
            .map(|argument| match split_pair(argument, "source")? {
                Some((id, path)) => Ok(Source::named(id, path)),
                None => Err(BackupError::Config(format!(
                    "Invalid key{}value pair for source: \"{}\"",
                    PAIR_SEPARATOR, argument
                ))),
            })
            .collect::<BackupResult<Vec<_>>>()?,
    };

    SourceSet::new(sources)
}
