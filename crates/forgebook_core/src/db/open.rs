//! Store bootstrap for file and in-memory databases.
//!
//! # Responsibility
//! - Open SQLite connections and configure required pragmas.
//! - Run the schema ledger before any table access is possible.
//!
//! # Invariants
//! - Returned stores have `foreign_keys=ON` and a 5s busy timeout.
//! - Returned stores have every ledger version applied.

use super::catalog::TableCatalog;
use super::migrations::apply_migrations;
use super::migrations::ledger::SchemaLedger;
use super::store::Store;
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

impl Store {
    /// Opens (or creates) a database file and applies pending versions.
    ///
    /// # Errors
    /// - `DbError::UpgradeFailed` when an upgrade routine fails; the file is
    ///   left exactly at its previous version.
    /// - `DbError::UnsupportedSchemaVersion` for files written by a newer
    ///   ledger.
    pub fn open(path: impl AsRef<Path>, ledger: &SchemaLedger) -> DbResult<Self> {
        open_with("file", || Connection::open(path), ledger)
    }

    /// Opens a private in-memory database and applies the whole ledger.
    pub fn open_in_memory(ledger: &SchemaLedger) -> DbResult<Self> {
        open_with("memory", Connection::open_in_memory, ledger)
    }
}

fn open_with(
    mode: &str,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
    ledger: &SchemaLedger,
) -> DbResult<Store> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = match connect() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, ledger) {
        Ok(applied) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={} schema_version={} versions_applied={}",
                mode,
                started_at.elapsed().as_millis(),
                ledger.latest_version(),
                applied
            );
            Ok(Store::from_parts(conn, TableCatalog::from_ledger(ledger)))
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, ledger: &SchemaLedger) -> DbResult<u32> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    apply_migrations(conn, ledger)
}
