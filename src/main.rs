use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use linkback::cli::{handle_backup_command, BackupCommands, CommandStatus};
use linkback::BackupError;

#[derive(Parser)]
#[command(
    name = "linkback",
    author = "Kaylee Beyene",
    version,
    about = "Incremental hard-link backups with retention",
    long_about = "linkback mirrors one or more source directories into timestamped \
                  snapshot directories. Unchanged files are hard-linked against the \
                  previous snapshot, so every snapshot is a complete tree while only \
                  changed files use new space. Old snapshots are pruned or recycled \
                  according to a retention window."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: BackupCommands,
}

fn run(cli: Cli) -> Result<CommandStatus> {
    Ok(handle_backup_command(cli.command, cli.verbose)?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<BackupError>()
                .map(BackupError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
