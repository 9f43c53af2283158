//! Command-line front end over `forgebook_core`.
//!
//! # Responsibility
//! - Open the configured store and run one maintenance command.
//! - Map fatal schema upgrade failures to a non-zero exit.

mod args;

use args::{Cli, Command};
use clap::Parser;
use forgebook_core::{
    check_drift, default_ledger, drift_report, init_logging, BackupService, CoreConfig, FileSettings, Notice,
    NoticeSink, ResolvedConfig, Severity, Store,
};
use log::{info, warn};
use std::fmt::Display;
use std::fs;
use std::process::ExitCode;

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_FATAL_STARTUP: u8 = 3;

#[derive(Debug)]
struct CliError {
    code: u8,
    message: String,
}

impl CliError {
    fn failure(err: impl Display) -> Self {
        Self {
            code: EXIT_FAILURE,
            message: err.to_string(),
        }
    }
}

/// Prints notices to stderr; sticky ones are marked.
struct ConsoleNoticeSink;

impl NoticeSink for ConsoleNoticeSink {
    fn notify(&self, notice: Notice) {
        let label = match notice.severity {
            Severity::Info => "info",
            Severity::Success => "ok",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        let marker = if notice.sticky { " [!]" } else { "" };
        eprintln!("{label}{marker}: {}", notice.message);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err.message);
            ExitCode::from(err.code)
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = CoreConfig::load(cli.config.as_deref()).map_err(|err| CliError {
        code: EXIT_USAGE,
        message: err.to_string(),
    })?;
    if let Err(err) = init_logging(&config.log_level, &config.log_dir) {
        eprintln!("warning: file logging disabled: {err}");
    }

    if let Command::Reset { yes: false } = cli.command {
        return Err(CliError {
            code: EXIT_USAGE,
            message: "refusing to erase all data without --yes".to_string(),
        });
    }

    // `check` prints the full two-way report itself.
    let drift_sink: Option<&dyn NoticeSink> = match cli.command {
        Command::Check => None,
        _ => Some(&ConsoleNoticeSink as &dyn NoticeSink),
    };
    let mut store = open_store(&config, drift_sink)?;
    info!(
        "event=cli_command module=cli status=start command={:?}",
        cli.command
    );

    let outcome = match cli.command {
        Command::Status => status(&store),
        Command::Check => {
            let report = drift_report(&store, &ConsoleNoticeSink);
            for table in &report.missing_from_catalog {
                println!("unregistered\t{table}");
            }
            for table in &report.missing_from_storage {
                println!("missing\t{table}");
            }
            if report.is_clean() {
                println!("catalog matches storage");
            }
            Ok(())
        }
        Command::Export { out } => {
            let dir = out.unwrap_or_else(|| config.backup_dir.clone());
            let path = backup_service(&config)?
                .export_to_dir(&store, &dir)
                .map_err(CliError::failure)?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Import { archive } => {
            let report = backup_service(&config)?
                .import_from_path(&mut store, &archive)
                .map_err(CliError::failure)?;
            for (table, rows) in &report.restored_rows {
                println!("{table}\t{rows}");
            }
            for path in &report.unresolved_assets {
                warn!("event=cli_import module=cli status=degraded unresolved_asset={path}");
                println!("unresolved asset\t{path}");
            }
            if let Some(err) = &report.settings_error {
                println!("local settings not fully restored: {err}");
            }
            Ok(())
        }
        Command::Reset { .. } => {
            let removed = backup_service(&config)?
                .factory_reset(&mut store)
                .map_err(CliError::failure)?;
            println!("removed {removed} rows");
            Ok(())
        }
    };
    outcome?;

    store.close().map_err(CliError::failure)
}

/// Opens and migrates the store, then warns about tables backups would miss.
fn open_store(
    config: &ResolvedConfig,
    drift_sink: Option<&dyn NoticeSink>,
) -> Result<Store, CliError> {
    let ledger = default_ledger().map_err(CliError::failure)?;
    fs::create_dir_all(&config.data_dir).map_err(CliError::failure)?;
    let store = Store::open(&config.db_path, &ledger).map_err(|err| {
        if err.is_fatal_startup() {
            CliError {
                code: EXIT_FATAL_STARTUP,
                message: format!(
                    "fatal: the database at {} cannot be opened: {err}",
                    config.db_path.display()
                ),
            }
        } else {
            CliError::failure(err)
        }
    })?;
    if let Some(sink) = drift_sink {
        check_drift(&store, sink);
    }
    Ok(store)
}

fn backup_service(
    config: &ResolvedConfig,
) -> Result<BackupService<FileSettings, ConsoleNoticeSink>, CliError> {
    let settings = FileSettings::open(&config.settings_path).map_err(CliError::failure)?;
    Ok(BackupService::new(settings, ConsoleNoticeSink))
}

fn status(store: &Store) -> Result<(), CliError> {
    let version = store.schema_version().map_err(CliError::failure)?;
    println!("schema_version\t{version}");
    for descriptor in store.catalog().list_tables() {
        let count = store
            .table(&descriptor.name)
            .and_then(|table| table.count())
            .map_err(CliError::failure)?;
        let scope = if descriptor.is_scoped() { "scoped" } else { "global" };
        let backup = if descriptor.included_in_backup() {
            ""
        } else {
            "\t(not backed up)"
        };
        println!("{}\t{scope}\t{count}{backup}", descriptor.name);
    }
    Ok(())
}
