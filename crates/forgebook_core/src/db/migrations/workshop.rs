//! Schema ledger shipped with the application.
//!
//! Released versions are frozen. Schema changes always append a new
//! version below the last one.

use super::ledger::{LedgerError, SchemaLedger, TableDecl, TableDelta};
use super::legacy_links::migrate_legacy_links;
use crate::db::catalog::FieldKind;
use crate::model::link::LINKS_TABLE;

/// Root entity table; always global.
pub const ROOT_TABLE: &str = "projects";
/// Natural-key table for in-database settings.
pub const SETTINGS_TABLE: &str = "settings";
/// Version that introduces `links` and rewrites legacy project relations.
pub const LINKS_VERSION: u32 = 3;

/// Builds the full application ledger.
pub fn default_ledger() -> Result<SchemaLedger, LedgerError> {
    let mut ledger = SchemaLedger::new(ROOT_TABLE);
    ledger
        .declare_version(1, version_1()?, None)?
        .declare_version(2, version_2()?, None)?
        .declare_version(LINKS_VERSION, version_3()?, Some(migrate_legacy_links))?
        .declare_version(4, version_4()?, None)?;
    Ok(ledger)
}

fn define(decl: TableDecl) -> TableDelta {
    TableDelta::Define(decl)
}

fn tasks(index_spec: &str) -> Result<TableDecl, LedgerError> {
    Ok(TableDecl::parse(index_spec)?
        .field("title", FieldKind::Text)
        .field("due_date", FieldKind::Date)
        .field("completed_at", FieldKind::Date)
        .field("created_at", FieldKind::Date))
}

fn version_1() -> Result<Vec<(&'static str, TableDelta)>, LedgerError> {
    Ok(vec![
        (
            ROOT_TABLE,
            define(
                TableDecl::parse("++id, status, category")?
                    .field("title", FieldKind::Text)
                    .field("description", FieldKind::Text)
                    .field("deadline", FieldKind::Date)
                    .field("created_at", FieldKind::Date)
                    .field("updated_at", FieldKind::Date),
            ),
        ),
        ("tasks", define(tasks("++id, project_id, status")?)),
        (
            "inventory",
            define(
                TableDecl::parse("++id, category, location")?
                    .field("name", FieldKind::Text)
                    .field("quantity", FieldKind::Numeric)
                    .field("purchased_at", FieldKind::Date),
            ),
        ),
        (
            "tools",
            define(
                TableDecl::parse("++id, category")?
                    .field("name", FieldKind::Text)
                    .field("last_maintained_at", FieldKind::Date),
            ),
        ),
        (
            "project_logs",
            define(
                TableDecl::parse("++id, project_id, logged_at")?
                    .field("body", FieldKind::Text)
                    .field("logged_at", FieldKind::Date)
                    .field("hours", FieldKind::Numeric),
            ),
        ),
        (
            SETTINGS_TABLE,
            define(TableDecl::parse("key")?.field("value", FieldKind::Text)),
        ),
    ])
}

fn version_2() -> Result<Vec<(&'static str, TableDelta)>, LedgerError> {
    Ok(vec![
        (
            "goals",
            define(
                TableDecl::parse("++id, status")?
                    .field("title", FieldKind::Text)
                    .field("target_date", FieldKind::Date)
                    .field("created_at", FieldKind::Date),
            ),
        ),
        (
            "project_images",
            define(
                TableDecl::parse("++id, project_id")?
                    .scoped()
                    .field("image", FieldKind::Blob)
                    .field("caption", FieldKind::Text)
                    .field("created_at", FieldKind::Date),
            ),
        ),
        (
            "music_tracks",
            define(
                TableDecl::parse("++id, title")?
                    .field("audio", FieldKind::Blob)
                    .field("added_at", FieldKind::Date),
            ),
        ),
        (
            "search_cache",
            define(
                TableDecl::parse("++id, entity_type, entity_id")?
                    .exclude_from_backup()
                    .field("built_at", FieldKind::Date),
            ),
        ),
    ])
}

fn version_3() -> Result<Vec<(&'static str, TableDelta)>, LedgerError> {
    Ok(vec![(
        LINKS_TABLE,
        define(
            TableDecl::parse(
                "++id, source_type, source_id, target_type, target_id, relationship",
            )?
            .global()
            .field("created_at", FieldKind::Date),
        ),
    )])
}

fn version_4() -> Result<Vec<(&'static str, TableDelta)>, LedgerError> {
    Ok(vec![
        (
            "documents",
            define(
                TableDecl::parse("++id, project_id, category")?
                    .scoped()
                    .field("file", FieldKind::Blob)
                    .field("file_name", FieldKind::Text)
                    .field("uploaded_at", FieldKind::Date),
            ),
        ),
        ("tasks", define(tasks("++id, project_id, status, due_date")?)),
    ])
}

#[cfg(test)]
mod tests {
    use super::{default_ledger, LINKS_VERSION, ROOT_TABLE};
    use crate::db::catalog::{FieldKind, TableCatalog};

    #[test]
    fn default_ledger_declares_four_versions() {
        let ledger = default_ledger().unwrap();
        assert_eq!(ledger.latest_version(), 4);
        assert!(ledger.versions()[(LINKS_VERSION - 1) as usize].has_upgrade());
        assert_eq!(ledger.root_table(), ROOT_TABLE);
    }

    #[test]
    fn workshop_tables_are_classified() {
        let catalog = TableCatalog::from_ledger(&default_ledger().unwrap());
        assert!(!catalog.is_scoped("projects"));
        assert!(catalog.is_scoped("tasks"));
        assert!(catalog.is_scoped("project_logs"));
        assert!(catalog.is_scoped("documents"));
        assert!(!catalog.is_scoped("links"));
        assert!(!catalog.is_scoped("settings"));
        assert!(!catalog
            .descriptor("search_cache")
            .unwrap()
            .included_in_backup());
    }

    #[test]
    fn tasks_gain_due_date_index_in_version_four() {
        let ledger = default_ledger().unwrap();
        let v3 = TableCatalog::at_version(&ledger, 3);
        let v4 = TableCatalog::at_version(&ledger, 4);
        assert!(!v3.descriptor("tasks").unwrap().indexed_fields.contains("due_date"));
        let tasks = v4.descriptor("tasks").unwrap();
        assert!(tasks.indexed_fields.contains("due_date"));
        assert_eq!(tasks.field_kind("due_date"), Some(FieldKind::Date));
        assert!(!v3.contains("documents"));
    }
}
