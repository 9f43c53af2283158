//! Table rows -> snapshot bundle.

use super::assets::{asset_path, BlobReference};
use super::{CodecResult, ManifestRow, SnapshotBundle};
use crate::db::{Store, TableDescriptor};
use crate::model::value::{format_iso_millis, Record, Value};
use crate::settings::SettingsStore;
use log::info;
use serde_json::{Map, Number, Value as Json};
use std::collections::BTreeMap;
use std::time::Instant;

/// Snapshots every backed-up catalog table plus allow-listed local settings.
///
/// Dates become ISO-8601 strings; binary values move into `assets` and are
/// replaced by blob reference placeholders.
pub fn serialize<S>(store: &Store, settings: &S) -> CodecResult<SnapshotBundle>
where
    S: SettingsStore + ?Sized,
{
    let started_at = Instant::now();
    let mut bundle = SnapshotBundle::default();

    for descriptor in store.catalog().backup_tables() {
        let rows = store.table(&descriptor.name)?.all()?;
        let mut encoded = Vec::with_capacity(rows.len());
        for row in &rows {
            encoded.push(encode_row(descriptor, row, &mut bundle.assets));
        }
        bundle.manifest.insert(descriptor.name.clone(), encoded);
    }
    bundle.local_settings = settings.snapshot()?;

    info!(
        "event=snapshot_serialize module=snapshot status=ok tables={} rows={} assets={} duration_ms={}",
        bundle.manifest.len(),
        bundle.row_count(),
        bundle.assets.len(),
        started_at.elapsed().as_millis()
    );
    Ok(bundle)
}

fn encode_row(
    descriptor: &TableDescriptor,
    row: &Record,
    assets: &mut BTreeMap<String, Vec<u8>>,
) -> ManifestRow {
    let row_id = row
        .get(descriptor.primary_key_field())
        .map(row_id_text)
        .unwrap_or_else(|| "unkeyed".to_string());
    let mut writer = AssetWriter {
        table: &descriptor.name,
        row_id: &row_id,
        assets,
    };
    row.iter()
        .map(|(field, value)| (field.clone(), writer.encode(field, value)))
        .collect()
}

fn row_id_text(value: &Value) -> String {
    match value {
        Value::Integer(id) => id.to_string(),
        Value::Text(text) => text.clone(),
        _ => "unkeyed".to_string(),
    }
}

struct AssetWriter<'a> {
    table: &'a str,
    row_id: &'a str,
    assets: &'a mut BTreeMap<String, Vec<u8>>,
}

impl AssetWriter<'_> {
    /// `field_path` joins nested map keys and list indexes with `.`.
    fn encode(&mut self, field_path: &str, value: &Value) -> Json {
        match value {
            Value::Null => Json::Null,
            Value::Bool(flag) => Json::Bool(*flag),
            Value::Integer(number) => Json::Number(Number::from(*number)),
            Value::Real(number) => Number::from_f64(*number).map_or(Json::Null, Json::Number),
            Value::Text(text) => Json::String(text.clone()),
            Value::Date(ts) => Json::String(format_iso_millis(ts)),
            Value::Blob(blob) => {
                let path = self.unique_path(asset_path(
                    self.table,
                    self.row_id,
                    field_path,
                    &blob.mime_type,
                ));
                self.assets.insert(path.clone(), blob.bytes.clone());
                BlobReference {
                    path,
                    mime_type: blob.mime_type.clone(),
                }
                .to_json()
            }
            Value::List(items) => Json::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| self.encode(&format!("{field_path}.{index}"), item))
                    .collect(),
            ),
            Value::Map(fields) => {
                let mut map = Map::new();
                for (key, item) in fields {
                    let encoded = self.encode(&format!("{field_path}.{key}"), item);
                    map.insert(key.clone(), encoded);
                }
                Json::Object(map)
            }
        }
    }

    // Sanitized natural keys can collide; later assets get a numeric suffix.
    fn unique_path(&self, path: String) -> String {
        if !self.assets.contains_key(&path) {
            return path;
        }
        let (stem, ext) = path.rsplit_once('.').unwrap_or((path.as_str(), "bin"));
        let mut suffix = 2_u32;
        loop {
            let candidate = format!("{stem}-{suffix}.{ext}");
            if !self.assets.contains_key(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }
}
