//! Backup use-case service.
//!
//! # Responsibility
//! - Export: snapshot every backed-up table plus local settings into one
//!   zip archive named with the current date.
//! - Import: validate an archive, then replace every table's contents in
//!   one transaction; restore local settings afterwards on a best-effort
//!   basis.
//! - Factory reset: clear every table in one transaction.
//!
//! # Invariants
//! - Nothing is cleared before the archive and manifest fully validate.
//! - Table replacement is all-or-nothing across every catalog table.
//! - Local settings failures never roll back a committed table restore.

use super::archive::{pack, unpack};
use crate::db::{Store, StoreError};
use crate::notice::{Notice, NoticeSink, Severity};
use crate::settings::{is_exported_key, SettingsStore};
use crate::snapshot::{deserialize, serialize, CodecError};
use chrono::{NaiveDate, Utc};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use zip::result::ZipError;

pub const DEFAULT_PRODUCT_NAME: &str = "forgebook";

pub type BackupResult<T> = Result<T, BackupError>;

#[derive(Debug)]
pub enum BackupError {
    Codec(CodecError),
    Store(StoreError),
    Zip(ZipError),
    Encode(serde_json::Error),
    Io { path: PathBuf, source: io::Error },
}

impl Display for BackupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Codec(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Zip(err) => write!(f, "backup archive is unreadable: {err}"),
            Self::Encode(err) => write!(f, "failed to encode backup: {err}"),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
        }
    }
}

impl Error for BackupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Codec(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Zip(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<CodecError> for BackupError {
    fn from(value: CodecError) -> Self {
        Self::Codec(value)
    }
}

impl From<StoreError> for BackupError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<ZipError> for BackupError {
    fn from(value: ZipError) -> Self {
        Self::Zip(value)
    }
}

/// In-memory export result.
#[derive(Debug, Clone)]
pub struct ExportArchive {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Rows written per table.
    pub table_counts: BTreeMap<String, usize>,
    pub asset_count: usize,
}

/// Outcome of a successful import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Rows inserted per catalog table; tables absent from the archive map
    /// to `0`.
    pub restored_rows: BTreeMap<String, usize>,
    pub ignored_tables: Vec<String>,
    pub unresolved_assets: Vec<String>,
    pub settings_restored: usize,
    /// First local-settings failure, if any; the table restore still stands.
    pub settings_error: Option<String>,
}

/// Export/import/reset orchestration over one store.
pub struct BackupService<S: SettingsStore, N: NoticeSink> {
    settings: S,
    notices: N,
    product_name: String,
}

impl<S: SettingsStore, N: NoticeSink> BackupService<S, N> {
    pub fn new(settings: S, notices: N) -> Self {
        Self {
            settings,
            notices,
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
        }
    }

    pub fn with_product_name(mut self, product_name: impl Into<String>) -> Self {
        self.product_name = product_name.into();
        self
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    pub fn notices(&self) -> &N {
        &self.notices
    }

    /// `<product>_backup_<YYYY-MM-DD>.zip`
    pub fn archive_file_name(&self, date: NaiveDate) -> String {
        format!("{}_backup_{}.zip", self.product_name, date.format("%Y-%m-%d"))
    }

    /// Builds the backup archive in memory.
    pub fn export_all(&self, store: &Store) -> BackupResult<ExportArchive> {
        let started_at = Instant::now();
        let result = self.build_archive(store);
        match &result {
            Ok(archive) => {
                info!(
                    "event=backup_export module=backup status=ok file={} bytes={} tables={} assets={} duration_ms={}",
                    archive.file_name,
                    archive.bytes.len(),
                    archive.table_counts.len(),
                    archive.asset_count,
                    started_at.elapsed().as_millis()
                );
                self.notices.notify(Notice::transient(
                    Severity::Success,
                    format!("Backup exported: {}", archive.file_name),
                ));
            }
            Err(err) => self.report_failure("backup_export", "Backup export failed", err),
        }
        result
    }

    /// Exports and writes the archive into `dir`; returns the written path.
    pub fn export_to_dir(&self, store: &Store, dir: &Path) -> BackupResult<PathBuf> {
        let archive = self.export_all(store)?;
        let io_err = |source: io::Error| BackupError::Io {
            path: dir.to_path_buf(),
            source,
        };
        fs::create_dir_all(dir).map_err(io_err)?;
        let path = dir.join(&archive.file_name);
        fs::write(&path, &archive.bytes).map_err(|source| BackupError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Replaces every table's contents with the archive's rows.
    ///
    /// # Errors
    /// - Archive or manifest problems abort before any table is touched.
    /// - Storage failures roll the whole table replacement back.
    pub fn import_all(&mut self, store: &mut Store, archive: &[u8]) -> BackupResult<ImportReport> {
        let started_at = Instant::now();
        let result = self.restore(store, archive);
        match &result {
            Ok(report) => {
                info!(
                    "event=backup_import module=backup status=ok tables={} rows={} ignored_tables={} unresolved_assets={} settings_restored={} duration_ms={}",
                    report.restored_rows.len(),
                    report.restored_rows.values().sum::<usize>(),
                    report.ignored_tables.len(),
                    report.unresolved_assets.len(),
                    report.settings_restored,
                    started_at.elapsed().as_millis()
                );
                self.notices.notify(Notice::transient(
                    Severity::Success,
                    "Backup restored",
                ));
            }
            Err(err) => self.report_failure("backup_import", "Backup import failed", err),
        }
        result
    }

    pub fn import_from_path(&mut self, store: &mut Store, path: &Path) -> BackupResult<ImportReport> {
        let bytes = fs::read(path).map_err(|source| BackupError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.import_all(store, &bytes)
    }

    /// Clears every catalog table in one transaction; returns rows removed.
    pub fn factory_reset(&self, store: &mut Store) -> BackupResult<usize> {
        let result = store.transaction(|tx| -> BackupResult<usize> {
            let mut removed = 0;
            for name in tx.catalog().table_names() {
                removed += tx.table(name)?.clear()?;
            }
            Ok(removed)
        });
        match &result {
            Ok(removed) => {
                info!("event=factory_reset module=backup status=ok rows_removed={removed}");
                self.notices
                    .notify(Notice::transient(Severity::Success, "All data was erased"));
            }
            Err(err) => self.report_failure("factory_reset", "Reset failed", err),
        }
        result
    }

    fn build_archive(&self, store: &Store) -> BackupResult<ExportArchive> {
        let bundle = serialize(store, &self.settings)?;
        let table_counts = bundle
            .manifest
            .iter()
            .map(|(table, rows)| (table.clone(), rows.len()))
            .collect();
        Ok(ExportArchive {
            file_name: self.archive_file_name(Utc::now().date_naive()),
            bytes: pack(&bundle)?,
            table_counts,
            asset_count: bundle.assets.len(),
        })
    }

    fn restore(&mut self, store: &mut Store, archive: &[u8]) -> BackupResult<ImportReport> {
        let bundle = unpack(archive)?;
        let decoded = deserialize(&bundle, store.catalog())?;
        let mut rows_by_table = decoded.rows;

        let restored_rows = store.transaction(|tx| -> BackupResult<BTreeMap<String, usize>> {
            let mut restored = BTreeMap::new();
            for name in tx.catalog().table_names() {
                let table = tx.table(name)?;
                table.clear()?;
                let rows = rows_by_table.remove(name).unwrap_or_default();
                let count = rows.len();
                table.bulk_add(rows)?;
                restored.insert(name.to_string(), count);
            }
            Ok(restored)
        })?;

        let mut report = ImportReport {
            restored_rows,
            ignored_tables: decoded.ignored_tables,
            unresolved_assets: decoded.unresolved_assets,
            ..ImportReport::default()
        };
        self.restore_settings(&bundle.local_settings, &mut report);
        Ok(report)
    }

    fn restore_settings(
        &mut self,
        values: &BTreeMap<String, Option<String>>,
        report: &mut ImportReport,
    ) {
        for (key, value) in values {
            if !is_exported_key(key) {
                warn!("event=settings_restore module=backup status=skip key={key}");
                continue;
            }
            match self.settings.set(key, value.as_deref()) {
                Ok(()) => report.settings_restored += 1,
                Err(err) => {
                    warn!(
                        "event=settings_restore module=backup status=error key={} error={}",
                        key, err
                    );
                    report.settings_error.get_or_insert_with(|| err.to_string());
                }
            }
        }
    }

    fn report_failure(&self, event: &str, message: &str, err: &BackupError) {
        error!("event={event} module=backup status=error error={err}");
        self.notices.notify(Notice::transient(
            Severity::Error,
            format!("{message}: {err}"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::BackupService;
    use crate::notice::CollectingNoticeSink;
    use crate::settings::MemorySettings;
    use chrono::NaiveDate;

    #[test]
    fn archive_name_uses_product_and_iso_date() {
        let service = BackupService::new(MemorySettings::new(), CollectingNoticeSink::new());
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            service.archive_file_name(date),
            "forgebook_backup_2024-03-09.zip"
        );
        assert_eq!(
            service
                .with_product_name("workshop")
                .archive_file_name(date),
            "workshop_backup_2024-03-09.zip"
        );
    }
}
