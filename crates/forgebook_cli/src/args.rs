use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// forgebook - local workshop data maintenance
#[derive(Parser, Debug)]
#[command(name = "forgebook")]
#[command(version)]
#[command(about = "Inspect, back up, and restore the local forgebook database", long_about = None)]
pub struct Cli {
    /// JSON config file (defaults apply when omitted)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show schema version and row counts per table
    Status,
    /// Compare live tables with the catalog
    Check,
    /// Write a backup archive
    Export {
        /// Target directory (defaults to the configured backup dir)
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,
    },
    /// Replace all data with the contents of a backup archive
    Import {
        /// Path to a `.zip` produced by `export`
        archive: PathBuf,
    },
    /// Erase every table
    Reset {
        /// Confirm the destructive reset
        #[arg(long = "yes")]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn export_accepts_output_dir() {
        let cli = Cli::parse_from(["forgebook", "export", "--out", "/tmp/backups"]);
        match cli.command {
            Command::Export { out } => assert_eq!(out, Some(PathBuf::from("/tmp/backups"))),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["forgebook", "status", "--config", "fb.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("fb.json")));
    }

    #[test]
    fn reset_defaults_to_unconfirmed() {
        let cli = Cli::parse_from(["forgebook", "reset"]);
        assert!(matches!(cli.command, Command::Reset { yes: false }));
    }
}
