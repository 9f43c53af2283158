//! Explicit storage handle shared by every subsystem.
//!
//! # Responsibility
//! - Own one migrated SQLite connection and the catalog resolved at open.
//! - Hand out table handles and run closures inside atomic transactions.
//!
//! # Invariants
//! - A `Store` only exists after every pending migration succeeded.
//! - Closures passed to `transaction` commit on `Ok` and roll back on `Err`.

use super::catalog::TableCatalog;
use super::migrations::current_user_version;
use super::table::{StoreError, StoreResult, Table};
use super::DbResult;
use log::{debug, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Open database plus the catalog of the schema it was migrated to.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    catalog: TableCatalog,
}

impl Store {
    pub(crate) fn from_parts(conn: Connection, catalog: TableCatalog) -> Self {
        Self { conn, catalog }
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }

    pub fn schema_version(&self) -> DbResult<u32> {
        current_user_version(&self.conn)
    }

    /// Table handle outside any explicit transaction.
    pub fn table(&self, name: &str) -> StoreResult<Table<'_>> {
        table_on(&self.conn, &self.catalog, name)
    }

    /// Runs `work` inside one immediate transaction.
    ///
    /// Every table operation issued through the `StoreTx` commits together;
    /// returning `Err` (or panicking) rolls all of them back.
    pub fn transaction<T, E, F>(&mut self, work: F) -> Result<T, E>
    where
        F: FnOnce(&StoreTx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let scope = StoreTx {
            tx,
            catalog: &self.catalog,
        };

        match work(&scope) {
            Ok(value) => {
                scope.tx.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                debug!("event=store_transaction module=store status=rollback");
                Err(err)
            }
        }
    }

    /// Names of all tables physically present in the database file.
    pub fn live_tables(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name
             FROM sqlite_master
             WHERE type = 'table'
               AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'
             ORDER BY name ASC;",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Raw connection for diagnostics and collaborator-owned SQL.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Closes the underlying connection, surfacing close errors.
    pub fn close(self) -> DbResult<()> {
        self.conn.close().map_err(|(_, err)| err)?;
        info!("event=db_close module=db status=ok");
        Ok(())
    }
}

/// Table access scoped to one open transaction.
pub struct StoreTx<'s> {
    tx: Transaction<'s>,
    catalog: &'s TableCatalog,
}

impl StoreTx<'_> {
    pub fn table(&self, name: &str) -> StoreResult<Table<'_>> {
        table_on(&self.tx, self.catalog, name)
    }

    pub fn catalog(&self) -> &TableCatalog {
        self.catalog
    }
}

fn table_on<'a>(
    conn: &'a Connection,
    catalog: &'a TableCatalog,
    name: &str,
) -> StoreResult<Table<'a>> {
    let descriptor = catalog
        .descriptor(name)
        .ok_or_else(|| StoreError::UnknownTable(name.to_string()))?;
    Ok(Table::new(conn, descriptor))
}
