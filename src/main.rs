use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use zborg::cli::{
    handle_check_command, handle_run_command, handle_snap_command, handle_tidy_command, Session,
};

#[derive(Parser)]
#[command(
    name = "zborg",
    version,
    about = "Tiered ZFS snapshot and borg archive backups",
    long_about = "zborg takes one ZFS snapshot per dataset and run, classified as a \
                  month, week or day copy, archives it with borg to a local and/or \
                  remote repository and prunes both to per-tier retention counts."
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); ZBORG_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot, archive and prune every configured dataset
    Run {
        /// Configuration file path, or a name looked up in the config directories
        config: String,
    },

    /// Archive an existing snapshot without creating or pruning anything
    Snap {
        /// Configuration file path or name
        config: String,
        /// Snapshot label to archive
        label: String,
    },

    /// Remove today's partial snapshots, archives and mounts after a failed run
    Tidy {
        /// Configuration file path or name
        config: String,
    },

    /// Validate a configuration and print the effective settings
    Check {
        /// Configuration file path or name
        config: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    zborg::logging::init(cli.verbose);

    match cli.command {
        Commands::Run { config } => {
            let session = Session::open(&config)?;
            handle_run_command(&session)?;
        }
        Commands::Snap { config, label } => {
            let session = Session::open(&config)?;
            handle_snap_command(&session, &label)?;
        }
        Commands::Tidy { config } => {
            let session = Session::open(&config)?;
            let report = handle_tidy_command(&session)?;
            if !report.is_clean() {
                bail!("tidy finished with {} failed step(s)", report.failures.len());
            }
        }
        Commands::Check { config } => {
            let session = Session::open(&config)?;
            handle_check_command(&session)?;
        }
    }

    Ok(())
}
