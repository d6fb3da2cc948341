//! Backup CLI commands
//!
//! Implements the `run`, `plan` and `list` commands.

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Subcommand};
use tracing::{error, info, warn};

use crate::backup::{preflight, SnapshotCatalog, SnapshotController};
use crate::config::paths::host_qualified;
use crate::config::{BackupConfig, RawOptions};
use crate::display::{format_plan, format_snapshot_list};
use crate::error::{BackupError, BackupResult};
use crate::logging::{self, LogSummary};
use crate::mirror::RsyncMirror;
use crate::models::SnapshotName;

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new snapshot
    Run(ConfigArgs),

    /// Show what a run would delete, recycle and link, without changing anything
    Plan(ConfigArgs),

    /// List the snapshots of a destination
    List(ListArgs),
}

/// Options describing a backup configuration
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// JSON settings file, used instead of the options below
    #[arg(
        long,
        conflicts_with_all = [
            "src",
            "dst",
            "keep",
            "exclude",
            "dst_fqdn",
            "log_dir",
            "log_summary",
            "mirror_program",
            "mirror_timeout",
        ]
    )]
    pub config: Option<PathBuf>,

    /// Source directory, or <id>~#~<path> when backing up several sources
    #[arg(long, num_args = 1.., value_name = "SRC")]
    pub src: Vec<String>,

    /// Destination directory
    #[arg(long, value_name = "DIR")]
    pub dst: Option<PathBuf>,

    /// Number of snapshots to keep (0 keeps all)
    #[arg(long, default_value_t = 0)]
    pub keep: usize,

    /// Exclude pattern, or <id>~#~<pattern> when backing up several sources
    #[arg(long, num_args = 1.., value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Append the fully qualified host name to the destination
    #[arg(
        long,
        alias = "dst_fqdn",
        value_name = "BOOL",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub dst_fqdn: bool,

    /// Directory for log files
    #[arg(long, alias = "log_dir", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// File listing the log files of the latest run
    #[arg(long, alias = "log_summary", value_name = "FILE")]
    pub log_summary: Option<PathBuf>,

    /// Mirroring program
    #[arg(long, value_name = "PROGRAM")]
    pub mirror_program: Option<PathBuf>,

    /// Kill the mirroring program after this many seconds
    #[arg(long, value_name = "SECS")]
    pub mirror_timeout: Option<u64>,
}

impl ConfigArgs {
    /// Build the validated configuration
    pub fn load(&self) -> BackupResult<BackupConfig> {
        if let Some(path) = &self.config {
            return BackupConfig::load(path);
        }

        BackupConfig::from_options(RawOptions {
            sources: self.src.clone(),
            destination: self.dst.clone().unwrap_or_default(),
            keep: self.keep,
            excludes: self.exclude.clone(),
            append_hostname: self.dst_fqdn,
            log_dir: self.log_dir.clone(),
            log_summary: self.log_summary.clone(),
            mirror_program: self.mirror_program.clone(),
            mirror_timeout: self.mirror_timeout.map(Duration::from_secs),
        })
    }
}

/// Options of the `list` command
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Destination directory
    #[arg(long, value_name = "DIR")]
    pub dst: PathBuf,

    /// Append the fully qualified host name to the destination
    #[arg(
        long,
        alias = "dst_fqdn",
        value_name = "BOOL",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub dst_fqdn: bool,
}

/// How a command finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    /// The snapshot was committed but some sources failed to mirror
    PartialFailure,
}

impl CommandStatus {
    /// Process exit code for this status
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::PartialFailure => 6,
        }
    }
}

/// Handle a backup command
pub fn handle_backup_command(cmd: BackupCommands, verbose: bool) -> BackupResult<CommandStatus> {
    match cmd {
        BackupCommands::Run(args) => handle_run(&args, verbose),
        BackupCommands::Plan(args) => handle_plan(&args, verbose),
        BackupCommands::List(args) => handle_list(&args, verbose),
    }
}

fn handle_run(args: &ConfigArgs, verbose: bool) -> BackupResult<CommandStatus> {
    let config = args.load()?;
    let now = SnapshotName::now();
    let run_log = config.paths.run_log_file(&now);

    let run_log_writer = logging::init_with_run_log(verbose)?;
    info!("linkback started at {}", now);

    // The run log is only opened once the log directory has been checked
    let mut log_files = Vec::new();
    let result = preflight::check(&config)
        .and_then(|()| run_log_writer.attach(&run_log))
        .and_then(|()| {
            log_files.push(run_log);
            run_backup(&config, now, &mut log_files)
        });

    if let Err(e) = &result {
        if e.is_pre_mutation() {
            error!("{}. No backup will be done", e);
        } else {
            error!("{}. Terminating backup process", e);
        }
    }

    // The summary's directory is only guaranteed once preconditions passed
    if config.paths.log_summary().parent().map_or(true, |p| p.as_os_str().is_empty() || p.is_dir()) {
        let summary = LogSummary::new(config.paths.log_summary().to_path_buf());
        if let Err(e) = summary.write(&log_files) {
            warn!("{}", e);
        }
    }

    info!("linkback finished");
    result
}

fn run_backup(
    config: &BackupConfig,
    now: SnapshotName,
    log_files: &mut Vec<PathBuf>,
) -> BackupResult<CommandStatus> {
    let mirror = RsyncMirror::new(&config.mirror);
    let report = SnapshotController::new(config, mirror).run(now)?;
    log_files.extend(report.mirror_logs.iter().cloned());

    println!("{}", report.summary());
    println!("Location: {}", report.snapshot.path.display());

    if !report.has_failures() {
        return Ok(CommandStatus::Success);
    }

    println!();
    println!("The following sources failed:");
    for failure in &report.failures {
        println!("  {}: {}", failure.source_label, failure.reason);
    }
    Ok(CommandStatus::PartialFailure)
}

fn handle_plan(args: &ConfigArgs, verbose: bool) -> BackupResult<CommandStatus> {
    let config = args.load()?;
    logging::init(verbose)?;

    let mirror = RsyncMirror::new(&config.mirror);
    let plan = SnapshotController::new(&config, mirror).preview(SnapshotName::now())?;

    println!("Destination: {}", config.paths.destination().display());
    println!();
    print!("{}", format_plan(&plan));
    Ok(CommandStatus::Success)
}

fn handle_list(args: &ListArgs, verbose: bool) -> BackupResult<CommandStatus> {
    if args.dst.as_os_str().is_empty() {
        return Err(BackupError::Config("A destination is required".into()));
    }
    let destination = if args.dst_fqdn {
        host_qualified(&args.dst)?
    } else {
        args.dst.clone()
    };
    logging::init(verbose)?;

    let catalog = SnapshotCatalog::list(&destination)?;
    print!(
        "{}",
        format_snapshot_list(&catalog, SnapshotName::now().datetime())
    );
    Ok(CommandStatus::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: BackupCommands,
    }

    fn parse(args: &[&str]) -> BackupCommands {
        TestCli::try_parse_from(std::iter::once("linkback").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn test_run_arguments_map_to_options() {
        let BackupCommands::Run(args) = parse(&[
            "run",
            "--src",
            "DATA~#~/data",
            "WWW~#~/var/www",
            "--dst",
            "/backup",
            "--keep",
            "3",
            "--exclude",
            "WWW~#~/var/www/cache/",
            "--dst-fqdn",
            "false",
            "--mirror-timeout",
            "60",
        ]) else {
            panic!("expected run");
        };

        let config = args.load().unwrap();
        assert_eq!(config.sources.ids(), vec!["DATA", "WWW"]);
        assert_eq!(config.keep, 3);
        assert_eq!(config.paths.destination(), std::path::Path::new("/backup"));
        assert_eq!(config.mirror.timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_dst_fqdn_accepts_boolish_values() {
        for (value, expected) in [("0", false), ("1", true), ("no", false), ("true", true)] {
            let BackupCommands::List(args) = parse(&["list", "--dst", "/b", "--dst-fqdn", value])
            else {
                panic!("expected list");
            };
            assert_eq!(args.dst_fqdn, expected);
        }

        let BackupCommands::List(args) = parse(&["list", "--dst", "/b"]) else {
            panic!("expected list");
        };
        assert!(args.dst_fqdn);
    }

    #[test]
    fn test_config_file_conflicts_with_sources() {
        let result = TestCli::try_parse_from([
            "linkback",
            "run",
            "--config",
            "linkback.json",
            "--src",
            "/data",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_file_conflicts_with_every_option() {
        for option in [
            &["--keep", "3"][..],
            &["--dst-fqdn", "false"],
            &["--log-dir", "/tmp/logs"],
            &["--log-summary", "/tmp/latest.txt"],
            &["--mirror-program", "/usr/bin/rsync"],
            &["--mirror-timeout", "60"],
        ] {
            let args = ["linkback", "plan", "--config", "linkback.json"]
                .into_iter()
                .chain(option.iter().copied());
            assert!(TestCli::try_parse_from(args).is_err(), "{:?}", option);
        }

        let BackupCommands::Plan(args) = parse(&["plan", "--config", "linkback.json"]) else {
            panic!("expected plan");
        };
        assert_eq!(args.config, Some(PathBuf::from("linkback.json")));
    }

    #[test]
    fn test_missing_destination_is_config_error() {
        let BackupCommands::Plan(args) = parse(&["plan", "--src", "/data"]) else {
            panic!("expected plan");
        };
        assert!(matches!(args.load(), Err(BackupError::Config(_))));
    }

    #[test]
    fn test_status_exit_codes() {
        assert_eq!(CommandStatus::Success.exit_code(), 0);
        assert_eq!(CommandStatus::PartialFailure.exit_code(), 6);
    }
}
