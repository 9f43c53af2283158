//! Schema ledger executor.
//!
//! # Responsibility
//! - Apply pending ledger versions (table DDL + upgrade routines) atomically.
//! - Mirror the applied version to `PRAGMA user_version`.
//!
//! # Invariants
//! - All pending versions run inside one transaction; any failure rolls
//!   back every DDL change, every upgrade write, and the version bump.
//! - Any failure while applying a version surfaces as `UpgradeFailed`.
//! - A database newer than the ledger is never opened.

pub mod index_spec;
pub mod ledger;
pub mod legacy_links;
pub mod workshop;

use crate::db::catalog::TableCatalog;
use crate::db::table::{StoreError, StoreResult, Table};
use crate::db::{DbError, DbResult};
use index_spec::{IndexDef, IndexSpec, KeyKind};
use ledger::{SchemaLedger, SchemaVersion, TableDecl, TableDelta, UpgradeError};
use log::{error, info};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};

/// Table access handed to upgrade routines.
///
/// Sees the schema exactly as declared at the version being applied.
pub struct UpgradeContext<'a> {
    conn: &'a Connection,
    catalog: TableCatalog,
    version: u32,
}

impl<'a> UpgradeContext<'a> {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }

    pub fn table(&self, name: &str) -> StoreResult<Table<'_>> {
        let descriptor = self
            .catalog
            .descriptor(name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))?;
        Ok(Table::new(self.conn, descriptor))
    }
}

/// Applies all pending versions; returns how many were applied.
pub fn apply_migrations(conn: &mut Connection, ledger: &SchemaLedger) -> DbResult<u32> {
    let current_version = current_user_version(conn)?;
    let latest = ledger.latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    let mut applied = 0;
    for entry in ledger.versions() {
        if entry.version() <= current_version {
            continue;
        }

        if let Err(err) = apply_version(&tx, ledger, entry) {
            error!(
                "event=schema_upgrade module=db status=error version={} error={}",
                entry.version(),
                err
            );
            return Err(DbError::UpgradeFailed {
                version: entry.version(),
                reason: err.to_string(),
            });
        }

        applied += 1;
        info!(
            "event=schema_upgrade module=db status=ok version={} tables_changed={} upgrade={}",
            entry.version(),
            entry.deltas().len(),
            entry.has_upgrade()
        );
    }
    tx.commit()?;

    Ok(applied)
}

/// Table changes, upgrade routine, and version bump of one ledger entry.
fn apply_version(
    conn: &Connection,
    ledger: &SchemaLedger,
    entry: &SchemaVersion,
) -> Result<(), UpgradeError> {
    let before = ledger.tables_at(entry.version().saturating_sub(1));
    apply_table_deltas(conn, entry, &before)?;

    if let Some(upgrade) = entry.upgrade {
        let context = UpgradeContext {
            conn,
            catalog: TableCatalog::at_version(ledger, entry.version()),
            version: entry.version(),
        };
        upgrade(&context)?;
    }

    conn.execute_batch(&format!("PRAGMA user_version = {};", entry.version()))
        .map_err(StoreError::from)?;
    Ok(())
}

/// Reads the schema version stored in the database file.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn apply_table_deltas(
    conn: &Connection,
    entry: &SchemaVersion,
    before: &BTreeMap<String, TableDecl>,
) -> StoreResult<()> {
    for (table, delta) in entry.deltas() {
        match (delta, before.get(table)) {
            (TableDelta::Define(decl), None) => {
                conn.execute_batch(&create_table_sql(table, decl.index_spec()))?;
                for index in &decl.index_spec().indexes {
                    conn.execute_batch(&create_index_sql(table, index))?;
                }
            }
            (TableDelta::Define(decl), Some(previous)) => {
                let old: BTreeSet<&IndexDef> = previous.index_spec().indexes.iter().collect();
                let new: BTreeSet<&IndexDef> = decl.index_spec().indexes.iter().collect();
                for removed in old.difference(&new) {
                    conn.execute_batch(&format!(
                        "DROP INDEX IF EXISTS \"{}\";",
                        removed.sql_name(table)
                    ))?;
                }
                for added in new.difference(&old) {
                    conn.execute_batch(&create_index_sql(table, added))?;
                }
            }
            (TableDelta::Drop, _) => {
                conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{table}\";"))?;
            }
        }
    }
    Ok(())
}

fn create_table_sql(table: &str, spec: &IndexSpec) -> String {
    let pk_column = match spec.primary_key.kind {
        KeyKind::AutoIncrement => "pk INTEGER PRIMARY KEY AUTOINCREMENT",
        KeyKind::Natural => "pk TEXT PRIMARY KEY NOT NULL",
    };
    format!("CREATE TABLE IF NOT EXISTS \"{table}\" ({pk_column}, doc TEXT NOT NULL);")
}

fn create_index_sql(table: &str, index: &IndexDef) -> String {
    let unique = if index.unique { "UNIQUE " } else { "" };
    format!(
        "CREATE {unique}INDEX IF NOT EXISTS \"{}\" ON \"{table}\" (json_extract(doc, '$.{}'));",
        index.sql_name(table),
        index.field
    )
}
