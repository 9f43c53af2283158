//! Consistency check between the live database and the table catalog.
//!
//! # Invariants
//! - Never fails and never blocks startup; problems surface as a sticky
//!   warning notice plus a log line.

use super::store::Store;
use crate::notice::{Notice, NoticeSink, Severity};
use log::{error, info, warn};
use std::collections::BTreeSet;

/// Result of comparing live tables with the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// Present in the database file but unknown to the catalog; these are
    /// silently skipped by backups.
    pub missing_from_catalog: Vec<String>,
    /// Declared by the catalog but absent from the database file.
    pub missing_from_storage: Vec<String>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.missing_from_catalog.is_empty() && self.missing_from_storage.is_empty()
    }
}

/// Returns live tables absent from the catalog and warns loudly if any.
pub fn check_drift(store: &Store, sink: &dyn NoticeSink) -> Vec<String> {
    drift_report(store, sink).missing_from_catalog
}

/// Full drift comparison in both directions.
pub fn drift_report(store: &Store, sink: &dyn NoticeSink) -> DriftReport {
    let live = match store.live_tables() {
        Ok(tables) => tables,
        Err(err) => {
            error!(
                "event=registry_drift module=validator status=error error_code=introspection_failed error={}",
                err
            );
            return DriftReport::default();
        }
    };

    let catalog = store.catalog();
    let live_set: BTreeSet<&str> = live.iter().map(String::as_str).collect();
    let report = DriftReport {
        missing_from_catalog: live
            .iter()
            .filter(|name| !catalog.contains(name))
            .cloned()
            .collect(),
        missing_from_storage: catalog
            .table_names()
            .into_iter()
            .filter(|name| !live_set.contains(name))
            .map(str::to_string)
            .collect(),
    };

    if !report.missing_from_catalog.is_empty() {
        let tables = report.missing_from_catalog.join(", ");
        warn!(
            "event=registry_drift module=validator status=drift missing_from_catalog={}",
            tables
        );
        sink.notify(Notice::sticky(
            Severity::Warning,
            format!(
                "Tables not registered in the catalog will be left out of backups: {tables}"
            ),
        ));
    }
    if !report.missing_from_storage.is_empty() {
        warn!(
            "event=registry_drift module=validator status=drift missing_from_storage={}",
            report.missing_from_storage.join(",")
        );
    }
    if report.is_clean() {
        info!(
            "event=registry_drift module=validator status=ok tables={}",
            live.len()
        );
    }

    report
}
