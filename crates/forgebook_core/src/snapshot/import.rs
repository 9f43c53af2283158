//! Snapshot bundle -> typed table rows.
//!
//! # Invariants
//! - Pure: never touches storage.
//! - Every row of every known table is checked before anything is returned.
//! - A placeholder whose asset is missing stays in place as a plain map.

use super::assets::BlobReference;
use super::{CodecError, CodecResult, ManifestRow, SnapshotBundle, TableRows};
use crate::db::document::number_to_value;
use crate::db::{FieldKind, TableCatalog, TableDescriptor};
use crate::model::value::{parse_iso_date, Blob, Record, Value};
use log::{info, warn};
use serde_json::Value as Json;
use std::collections::BTreeMap;

const DATE_SUFFIXES: &[&str] = &["_at", "_date", "_on"];
const DATE_FIELD_NAMES: &[&str] = &[
    "date",
    "timestamp",
    "deadline",
    "due_date",
    "start_date",
    "end_date",
];

/// Result of decoding a bundle against the current catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedSnapshot {
    /// Rows for tables the current catalog knows.
    pub rows: TableRows,
    /// Asset paths referenced by the manifest but absent from the archive.
    pub unresolved_assets: Vec<String>,
    /// Bundle tables unknown to the current catalog; never restored.
    pub ignored_tables: Vec<String>,
}

/// Whether an undeclared string field is treated as a date candidate.
pub fn is_date_field_name(name: &str) -> bool {
    DATE_FIELD_NAMES.contains(&name) || DATE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Decodes manifest rows into typed records.
///
/// Declared field kinds decide date reconstitution; undeclared fields fall
/// back to the field-name rule in `is_date_field_name`.
///
/// # Errors
/// - `ManifestCorrupt` when a row carries a primary key of the wrong type.
pub fn deserialize(bundle: &SnapshotBundle, catalog: &TableCatalog) -> CodecResult<DecodedSnapshot> {
    let mut decoded = DecodedSnapshot::default();

    for (table, rows) in &bundle.manifest {
        let Some(descriptor) = catalog.descriptor(table) else {
            decoded.ignored_tables.push(table.clone());
            continue;
        };
        let mut reader = AssetReader {
            assets: &bundle.assets,
            unresolved: &mut decoded.unresolved_assets,
        };
        let mut records = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            check_primary_key(descriptor, index, row)?;
            records.push(reader.decode_row(descriptor, row));
        }
        decoded.rows.insert(table.clone(), records);
    }

    if !decoded.unresolved_assets.is_empty() {
        warn!(
            "event=snapshot_deserialize module=snapshot status=degraded unresolved_assets={}",
            decoded.unresolved_assets.join(",")
        );
    }
    if !decoded.ignored_tables.is_empty() {
        info!(
            "event=snapshot_deserialize module=snapshot status=skip ignored_tables={}",
            decoded.ignored_tables.join(",")
        );
    }
    Ok(decoded)
}

fn check_primary_key(descriptor: &TableDescriptor, index: usize, row: &ManifestRow) -> CodecResult<()> {
    let field = descriptor.primary_key_field();
    let valid = match (row.get(field), descriptor.has_auto_key()) {
        (None | Some(Json::Null), true) => true,
        (Some(Json::Number(number)), true) => number.is_i64(),
        (Some(Json::String(text)), false) => !text.is_empty(),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(CodecError::ManifestCorrupt(format!(
            "row {index} of table `{}` has an invalid `{field}` key",
            descriptor.name
        )))
    }
}

struct AssetReader<'a> {
    assets: &'a BTreeMap<String, Vec<u8>>,
    unresolved: &'a mut Vec<String>,
}

impl AssetReader<'_> {
    fn decode_row(&mut self, descriptor: &TableDescriptor, row: &ManifestRow) -> Record {
        row.iter()
            .map(|(field, json)| {
                let value = self.decode(field, descriptor.field_kind(field), json);
                (field.clone(), value)
            })
            .collect()
    }

    fn decode(&mut self, name: &str, kind: Option<FieldKind>, json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(flag) => Value::Bool(*flag),
            Json::Number(number) => number_to_value(number),
            Json::String(text) => decode_text(name, kind, text),
            Json::Array(items) => Value::List(
                items
                    .iter()
                    .map(|item| self.decode(name, kind, item))
                    .collect(),
            ),
            Json::Object(map) => {
                if let Some(reference) = BlobReference::from_json(map) {
                    if let Some(bytes) = self.assets.get(&reference.path) {
                        return Value::Blob(Blob::new(reference.mime_type, bytes.clone()));
                    }
                    self.unresolved.push(reference.path);
                }
                Value::Map(
                    map.iter()
                        .map(|(key, item)| (key.clone(), self.decode(key, None, item)))
                        .collect(),
                )
            }
        }
    }
}

fn decode_text(name: &str, kind: Option<FieldKind>, text: &str) -> Value {
    let date_candidate = match kind {
        Some(FieldKind::Date) => true,
        Some(_) => false,
        None => is_date_field_name(name),
    };
    if date_candidate {
        if let Some(parsed) = parse_iso_date(text) {
            return Value::Date(parsed);
        }
    }
    Value::Text(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::{deserialize, is_date_field_name};
    use crate::db::migrations::workshop::default_ledger;
    use crate::db::{FieldKind, SchemaLedger, TableCatalog, TableDecl, TableDelta};
    use crate::model::value::{parse_iso_date, Value};
    use crate::snapshot::{parse_manifest, CodecError, SnapshotBundle};
    use std::collections::BTreeMap;

    fn bundle(manifest: &str) -> SnapshotBundle {
        SnapshotBundle {
            manifest: parse_manifest(manifest.as_bytes()).unwrap(),
            ..SnapshotBundle::default()
        }
    }

    fn catalog() -> TableCatalog {
        TableCatalog::from_ledger(&default_ledger().unwrap())
    }

    #[test]
    fn date_named_fields_are_reconstituted_and_others_left_alone() {
        let decoded = deserialize(
            &bundle(
                r#"{"tools":[{"id":1,"created_at":"2024-01-01T00:00:00.000Z","title":"2024-01-01T00:00:00.000Z"}]}"#,
            ),
            &catalog(),
        )
        .unwrap();

        let row = &decoded.rows["tools"][0];
        assert_eq!(
            row.get("created_at"),
            Some(&Value::Date(parse_iso_date("2024-01-01T00:00:00.000Z").unwrap()))
        );
        assert_eq!(
            row.get("title"),
            Some(&Value::Text("2024-01-01T00:00:00.000Z".to_string()))
        );
    }

    #[test]
    fn declared_text_fields_never_become_dates() {
        let decoded = deserialize(
            &bundle(r#"{"settings":[{"key":"last_sync_at","value":"2024-05-05"}]}"#),
            &catalog(),
        )
        .unwrap();
        assert_eq!(
            decoded.rows["settings"][0].get("value"),
            Some(&Value::Text("2024-05-05".to_string()))
        );
    }

    #[test]
    fn any_declared_kind_overrides_the_date_name_rule() {
        let mut ledger = SchemaLedger::new("projects");
        ledger
            .declare_version(
                1,
                [
                    ("projects", TableDelta::Define(TableDecl::parse("++id").unwrap())),
                    (
                        "meters",
                        TableDelta::Define(
                            TableDecl::parse("++id")
                                .unwrap()
                                .field("reading_on", FieldKind::Numeric)
                                .field("scan_at", FieldKind::Blob)
                                .field("read_at", FieldKind::Date),
                        ),
                    ),
                ],
                None,
            )
            .unwrap();
        let stamp = "2024-01-01T00:00:00.000Z";
        let decoded = deserialize(
            &bundle(&format!(
                r#"{{"meters":[{{"id":1,"reading_on":"{stamp}","scan_at":"{stamp}","read_at":"{stamp}","taken_at":"{stamp}"}}]}}"#
            )),
            &TableCatalog::from_ledger(&ledger),
        )
        .unwrap();

        let row = &decoded.rows["meters"][0];
        let date = Value::Date(parse_iso_date(stamp).unwrap());
        assert_eq!(row.get("reading_on"), Some(&Value::Text(stamp.to_string())));
        assert_eq!(row.get("scan_at"), Some(&Value::Text(stamp.to_string())));
        assert_eq!(row.get("read_at"), Some(&date));
        assert_eq!(row.get("taken_at"), Some(&date));
    }

    #[test]
    fn unparsable_date_text_stays_a_string() {
        let decoded = deserialize(
            &bundle(r#"{"tasks":[{"id":3,"due_date":"next friday"}]}"#),
            &catalog(),
        )
        .unwrap();
        assert_eq!(
            decoded.rows["tasks"][0].get("due_date"),
            Some(&Value::Text("next friday".to_string()))
        );
    }

    #[test]
    fn placeholders_resolve_against_assets_or_stay_in_place() {
        let mut input = bundle(
            r#"{"music_tracks":[
                {"id":1,"audio":{"kind":"blob_reference","path":"music_tracks/1_audio.mp3","mimeType":"audio/mpeg"}},
                {"id":2,"audio":{"kind":"blob_reference","path":"music_tracks/2_audio.mp3","mimeType":"audio/mpeg"}}
            ]}"#,
        );
        input.assets = BTreeMap::from([("music_tracks/1_audio.mp3".to_string(), vec![7_u8, 7])]);

        let decoded = deserialize(&input, &catalog()).unwrap();
        let rows = &decoded.rows["music_tracks"];
        let blob = rows[0].get("audio").and_then(Value::as_blob).unwrap();
        assert_eq!(blob.bytes, vec![7, 7]);
        assert_eq!(blob.mime_type, "audio/mpeg");

        assert!(matches!(rows[1].get("audio"), Some(Value::Map(_))));
        assert_eq!(decoded.unresolved_assets, vec!["music_tracks/2_audio.mp3"]);
    }

    #[test]
    fn unknown_tables_are_ignored() {
        let decoded = deserialize(
            &bundle(r#"{"retired_table":[{"id":1}],"goals":[]}"#),
            &catalog(),
        )
        .unwrap();
        assert_eq!(decoded.ignored_tables, vec!["retired_table"]);
        assert!(decoded.rows.contains_key("goals"));
    }

    #[test]
    fn mistyped_primary_keys_are_corrupt() {
        let err = deserialize(&bundle(r#"{"projects":[{"id":"one"}]}"#), &catalog()).unwrap_err();
        assert!(matches!(err, CodecError::ManifestCorrupt(_)));
    }

    #[test]
    fn date_name_rule_matches_suffixes_and_known_names() {
        assert!(is_date_field_name("created_at"));
        assert!(is_date_field_name("target_date"));
        assert!(is_date_field_name("deadline"));
        assert!(is_date_field_name("installed_on"));
        assert!(!is_date_field_name("title"));
        assert!(!is_date_field_name("category"));
    }
}
