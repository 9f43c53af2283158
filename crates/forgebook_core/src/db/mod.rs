//! Embedded document store: schema ledger, catalog, tables, transactions.
//!
//! # Responsibility
//! - Open SQLite-backed stores and evolve their schema through the ledger.
//! - Expose the generic per-table interface every other subsystem uses.
//! - Detect drift between the live database and the catalog.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No table is readable or writable before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod catalog;
pub(crate) mod document;
pub mod migrations;
mod open;
pub mod store;
pub mod table;
pub mod validator;

pub use catalog::{
    FieldKind, SerializationPolicy, TableCatalog, TableDescriptor, TableScope,
    PARENT_REFERENCE_FIELD,
};
pub use migrations::ledger::{
    LedgerError, SchemaLedger, TableDecl, TableDelta, UpgradeError, UpgradeFn,
};
pub use migrations::UpgradeContext;
pub use store::{Store, StoreTx};
pub use table::{StoreError, StoreResult, Table};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// An upgrade routine failed; the database was left at its prior
    /// version. Unrecoverable at startup.
    UpgradeFailed {
        version: u32,
        reason: String,
    },
}

impl DbError {
    /// Whether the application must stop and show a fatal startup error.
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            Self::UpgradeFailed { .. } | Self::UnsupportedSchemaVersion { .. }
        )
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::UpgradeFailed { version, reason } => write!(
                f,
                "schema upgrade to version {version} failed and was rolled back: {reason}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::UpgradeFailed { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
