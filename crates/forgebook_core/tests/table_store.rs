use forgebook_core::db::migrations::workshop::default_ledger;
use forgebook_core::db::{SchemaLedger, Store, StoreError, TableDecl, TableDelta};
use forgebook_core::model::value::{Record, RowKey, Value};
use chrono::{TimeZone, Utc};

#[test]
fn add_get_update_delete_round_trip() {
    let store = store();
    let tasks = store.table("tasks").unwrap();

    let due = Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap();
    let key = tasks
        .add(
            Record::new()
                .with("project_id", 1_i64)
                .with("title", "Sand the tabletop")
                .with("due_date", due),
        )
        .unwrap();
    assert_eq!(key, RowKey::Int(1));

    assert!(tasks
        .update(1_i64, Record::new().with("status", "done"))
        .unwrap());
    let row = tasks.get(1_i64).unwrap().unwrap();
    assert_eq!(row.get_str("title"), Some("Sand the tabletop"));
    assert_eq!(row.get_str("status"), Some("done"));
    assert_eq!(row.get("due_date").and_then(Value::as_date), Some(&due));
    assert_eq!(row.get_i64("id"), Some(1));

    assert!(!tasks.update(99_i64, Record::new().with("status", "x")).unwrap());
    assert!(tasks.delete(1_i64).unwrap());
    assert!(!tasks.delete(1_i64).unwrap());
    assert!(tasks.get(1_i64).unwrap().is_none());
}

#[test]
fn natural_key_tables_require_their_key() {
    let store = store();
    let settings = store.table("settings").unwrap();

    settings
        .put(Record::new().with("key", "units").with("value", "metric"))
        .unwrap();
    settings
        .put(Record::new().with("key", "units").with("value", "imperial"))
        .unwrap();
    assert_eq!(settings.count().unwrap(), 1);
    assert_eq!(
        settings.get("units").unwrap().unwrap().get_str("value"),
        Some("imperial")
    );

    assert!(matches!(
        settings.add(Record::new().with("value", "orphan")),
        Err(StoreError::MissingKey { .. })
    ));
    assert!(matches!(settings.get(3_i64), Err(StoreError::InvalidKey { .. })));
}

#[test]
fn where_equals_uses_document_fields() {
    let store = store();
    let tasks = store.table("tasks").unwrap();
    tasks
        .bulk_add(vec![
            Record::new().with("project_id", 1_i64).with("status", "open"),
            Record::new().with("project_id", 2_i64).with("status", "open"),
            Record::new().with("project_id", 1_i64).with("status", "done"),
        ])
        .unwrap();

    let for_project = tasks.where_equals("project_id", &Value::Integer(1)).unwrap();
    assert_eq!(for_project.len(), 2);
    assert_eq!(
        tasks
            .where_equals("status", &Value::from("open"))
            .unwrap()
            .len(),
        2
    );
    assert!(matches!(
        tasks.where_equals("status", &Value::List(vec![])),
        Err(StoreError::UnsupportedQuery { .. })
    ));
}

#[test]
fn bulk_add_is_all_or_nothing() {
    let store = unique_store();
    let tools = store.table("tools").unwrap();
    tools.add(Record::new().with("slug", "chisel")).unwrap();

    let err = tools
        .bulk_add(vec![
            Record::new().with("slug", "plane"),
            Record::new().with("slug", "chisel"),
        ])
        .unwrap_err();
    assert!(matches!(err, StoreError::Constraint { .. }));
    assert_eq!(tools.count().unwrap(), 1);
}

#[test]
fn transaction_rolls_back_every_table_on_error() {
    let mut store = store();
    store
        .table("projects")
        .unwrap()
        .add(Record::new().with("title", "Shed"))
        .unwrap();

    let result: Result<(), StoreError> = store.transaction(|tx| {
        tx.table("projects")?.clear()?;
        tx.table("tasks")?
            .add(Record::new().with("project_id", 1_i64))?;
        Err(StoreError::UnknownTable("abort".to_string()))
    });
    assert!(result.is_err());

    assert_eq!(store.table("projects").unwrap().count().unwrap(), 1);
    assert_eq!(store.table("tasks").unwrap().count().unwrap(), 0);
}

#[test]
fn transaction_commits_on_ok() {
    let mut store = store();
    let key = store
        .transaction(|tx| -> Result<RowKey, StoreError> {
            let key = tx
                .table("projects")?
                .add(Record::new().with("title", "Canoe"))?;
            tx.table("tasks")?
                .add(Record::new().with("project_id", key.as_int().unwrap_or_default()))?;
            Ok(key)
        })
        .unwrap();

    assert!(store.table("projects").unwrap().get(key).unwrap().is_some());
    assert_eq!(store.table("tasks").unwrap().count().unwrap(), 1);
}

#[test]
fn unknown_tables_are_rejected() {
    let store = store();
    assert!(matches!(
        store.table("invoices"),
        Err(StoreError::UnknownTable(name)) if name == "invoices"
    ));
}

fn store() -> Store {
    Store::open_in_memory(&default_ledger().unwrap()).unwrap()
}

fn unique_store() -> Store {
    let mut ledger = SchemaLedger::new("projects");
    ledger
        .declare_version(
            1,
            [
                (
                    "projects",
                    TableDelta::Define(TableDecl::parse("++id").unwrap()),
                ),
                (
                    "tools",
                    TableDelta::Define(TableDecl::parse("++id, &slug").unwrap()),
                ),
            ],
            None,
        )
        .unwrap();
    Store::open_in_memory(&ledger).unwrap()
}
