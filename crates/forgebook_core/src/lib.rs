//! Persistence and backup engine for the forgebook workshop tracker.
//! Storage, schema evolution, and backups live here; hosts only render.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod notice;
pub mod repo;
pub mod service;
pub mod settings;
pub mod snapshot;

pub use config::{ConfigError, CoreConfig, ResolvedConfig};
pub use db::migrations::workshop::default_ledger;
pub use db::validator::{check_drift, drift_report, DriftReport};
pub use db::{
    DbError, DbResult, FieldKind, LedgerError, SchemaLedger, Store, StoreError, StoreResult,
    Table, TableCatalog, TableDecl, TableDelta, TableDescriptor, TableScope,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::link::{EntityRef, Link, LinkKind};
pub use model::value::{Blob, Record, RowKey, Timestamp, Value};
pub use notice::{CollectingNoticeSink, LogNoticeSink, Notice, NoticeSink, Severity};
pub use repo::link_repo::{LinkRepository, RepoError, RepoResult, TableLinkRepository};
pub use service::backup_service::{
    BackupError, BackupResult, BackupService, ExportArchive, ImportReport,
};
pub use settings::{FileSettings, MemorySettings, SettingsError, SettingsStore, LOCAL_SETTING_KEYS};
pub use snapshot::{CodecError, SnapshotBundle};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
