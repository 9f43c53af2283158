use forgebook_core::db::migrations::workshop::default_ledger;
use forgebook_core::db::{SchemaLedger, Store, TableCatalog, TableDecl, TableDelta, TableScope};
use forgebook_core::notice::{CollectingNoticeSink, Severity};
use forgebook_core::{check_drift, drift_report};

#[test]
fn fresh_store_has_no_drift() {
    let store = Store::open_in_memory(&default_ledger().unwrap()).unwrap();
    let sink = CollectingNoticeSink::new();

    assert!(check_drift(&store, &sink).is_empty());
    assert!(drift_report(&store, &sink).is_clean());
    assert!(sink.notices().is_empty());
}

#[test]
fn unregistered_table_raises_sticky_warning() {
    let store = Store::open_in_memory(&default_ledger().unwrap()).unwrap();
    store
        .connection()
        .execute_batch("CREATE TABLE scratch_notes (pk INTEGER PRIMARY KEY, doc TEXT);")
        .unwrap();
    let sink = CollectingNoticeSink::new();

    assert_eq!(check_drift(&store, &sink), vec!["scratch_notes"]);

    let notices = sink.take();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].severity, Severity::Warning);
    assert!(notices[0].sticky);
    assert!(notices[0].message.contains("scratch_notes"));
}

#[test]
fn dropped_catalog_table_is_reported_without_notice() {
    let store = Store::open_in_memory(&default_ledger().unwrap()).unwrap();
    store
        .connection()
        .execute_batch("DROP TABLE search_cache;")
        .unwrap();
    let sink = CollectingNoticeSink::new();

    let report = drift_report(&store, &sink);
    assert!(report.missing_from_catalog.is_empty());
    assert_eq!(report.missing_from_storage, vec!["search_cache"]);
    assert!(sink.notices().is_empty());
}

#[test]
fn workshop_tables_classify_by_project_reference() {
    let catalog = TableCatalog::from_ledger(&default_ledger().unwrap());

    assert_eq!(catalog.root_table(), "projects");
    for table in ["tasks", "project_logs", "project_images", "documents"] {
        assert!(catalog.is_scoped(table), "{table} should be scoped");
    }
    for table in ["projects", "tools", "goals", "links", "settings", "music_tracks"] {
        assert!(!catalog.is_scoped(table), "{table} should be global");
    }
    assert!(!catalog.descriptor("search_cache").unwrap().included_in_backup());
    assert!(catalog.backup_tables().all(|table| table.name != "search_cache"));
}

#[test]
fn explicit_scope_beats_index_rule_except_for_root() {
    let mut ledger = SchemaLedger::new("projects");
    ledger
        .declare_version(
            1,
            [
                ("projects", define(TableDecl::parse("++id, project_id").unwrap().scoped())),
                ("receipts", define(TableDecl::parse("++id, project_id").unwrap().global())),
                ("sketches", define(TableDecl::parse("++id").unwrap().scoped())),
                ("parts", define(TableDecl::parse("++id, project_id").unwrap())),
                ("vendors", define(TableDecl::parse("++id, name").unwrap())),
            ],
            None,
        )
        .unwrap();
    let catalog = TableCatalog::from_ledger(&ledger);

    assert_eq!(scope(&catalog, "projects"), TableScope::Global);
    assert_eq!(scope(&catalog, "receipts"), TableScope::Global);
    assert_eq!(scope(&catalog, "sketches"), TableScope::Scoped);
    assert_eq!(scope(&catalog, "parts"), TableScope::Scoped);
    assert_eq!(scope(&catalog, "vendors"), TableScope::Global);
}

fn define(decl: TableDecl) -> TableDelta {
    TableDelta::Define(decl)
}

fn scope(catalog: &TableCatalog, table: &str) -> TableScope {
    catalog.descriptor(table).unwrap().scope
}
