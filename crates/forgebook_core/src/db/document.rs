//! Lossless JSON encoding of documents in the `doc` column.
//!
//! Plain values map to plain JSON. Dates and blobs become tagged objects so
//! they keep their identity in storage:
//!
//! ```text
//! {"$date": "2024-01-01T00:00:00.000Z"}
//! {"$blob": "<base64>", "mime_type": "image/png"}
//! ```
//!
//! Non-finite reals are stored as `null`.

use crate::model::value::{format_iso_millis, parse_iso_date, Blob, Record, Value};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Number, Value as Json};

const DATE_TAG: &str = "$date";
const BLOB_TAG: &str = "$blob";
const BLOB_MIME: &str = "mime_type";

/// Encodes every field except `skip_field` (the primary key column).
pub(crate) fn encode_document(record: &Record, skip_field: &str) -> String {
    let map: Map<String, Json> = record
        .iter()
        .filter(|(field, _)| field.as_str() != skip_field)
        .map(|(field, value)| (field.clone(), encode_value(value)))
        .collect();
    Json::Object(map).to_string()
}

pub(crate) fn decode_document(text: &str) -> Result<Record, String> {
    match serde_json::from_str::<Json>(text) {
        Ok(Json::Object(map)) => Ok(map
            .into_iter()
            .map(|(field, json)| (field, decode_value(json)))
            .collect()),
        Ok(other) => Err(format!("document is not an object: {other}")),
        Err(err) => Err(format!("document is not valid JSON: {err}")),
    }
}

fn encode_value(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(flag) => Json::Bool(*flag),
        Value::Integer(number) => Json::Number(Number::from(*number)),
        Value::Real(number) => Number::from_f64(*number).map_or(Json::Null, Json::Number),
        Value::Text(text) => Json::String(text.clone()),
        Value::Date(ts) => {
            let mut tagged = Map::new();
            tagged.insert(DATE_TAG.to_string(), Json::String(format_iso_millis(ts)));
            Json::Object(tagged)
        }
        Value::Blob(blob) => {
            let mut tagged = Map::new();
            tagged.insert(BLOB_TAG.to_string(), Json::String(BASE64.encode(&blob.bytes)));
            tagged.insert(BLOB_MIME.to_string(), Json::String(blob.mime_type.clone()));
            Json::Object(tagged)
        }
        Value::List(items) => Json::Array(items.iter().map(encode_value).collect()),
        Value::Map(fields) => Json::Object(
            fields
                .iter()
                .map(|(key, item)| (key.clone(), encode_value(item)))
                .collect(),
        ),
    }
}

fn decode_value(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(flag) => Value::Bool(flag),
        Json::Number(number) => number_to_value(&number),
        Json::String(text) => Value::Text(text),
        Json::Array(items) => Value::List(items.into_iter().map(decode_value).collect()),
        Json::Object(map) => decode_object(map),
    }
}

pub(crate) fn number_to_value(number: &Number) -> Value {
    match number.as_i64() {
        Some(int) => Value::Integer(int),
        None => Value::Real(number.as_f64().unwrap_or(f64::NAN)),
    }
}

fn decode_object(map: Map<String, Json>) -> Value {
    if let Some(tagged) = decode_tagged(&map) {
        return tagged;
    }
    Value::Map(
        map.into_iter()
            .map(|(key, item)| (key, decode_value(item)))
            .collect(),
    )
}

fn decode_tagged(map: &Map<String, Json>) -> Option<Value> {
    if map.len() == 1 {
        let text = map.get(DATE_TAG)?.as_str()?;
        return parse_iso_date(text).map(Value::Date);
    }
    if map.len() == 2 {
        let encoded = map.get(BLOB_TAG)?.as_str()?;
        let mime_type = map.get(BLOB_MIME)?.as_str()?;
        let bytes = BASE64.decode(encoded).ok()?;
        return Some(Value::Blob(Blob::new(mime_type, bytes)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{decode_document, encode_document};
    use crate::model::value::{Record, Value};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    #[test]
    fn dates_blobs_and_nesting_survive_storage() {
        let mut nested = BTreeMap::new();
        nested.insert("thumb".to_string(), Value::blob("image/png", vec![0_u8, 159, 146, 150]));
        let record = Record::new()
            .with("id", 9_i64)
            .with("title", "Workbench")
            .with("budget", 120.5)
            .with(
                "created_at",
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            )
            .with("photo", Value::blob("image/jpeg", vec![255_u8, 216, 255]))
            .with("tags", Value::List(vec![Value::from("wood"), Value::Integer(2)]))
            .with("extra", Value::Map(nested))
            .with("archived", false)
            .with("notes", Value::Null);

        let text = encode_document(&record, "id");
        assert!(!text.contains("\"id\""));

        let mut decoded = decode_document(&text).unwrap();
        decoded.set("id", 9_i64);
        assert_eq!(decoded, record);
    }

    #[test]
    fn plain_maps_with_similar_keys_stay_maps() {
        let mut near_miss = BTreeMap::new();
        near_miss.insert("$date".to_string(), Value::from("not a date"));
        let record = Record::new().with("meta", Value::Map(near_miss.clone()));

        let decoded = decode_document(&encode_document(&record, "id")).unwrap();
        assert_eq!(decoded.get("meta"), Some(&Value::Map(near_miss)));
    }

    #[test]
    fn non_object_documents_are_rejected() {
        assert!(decode_document("[1,2]").is_err());
        assert!(decode_document("{truncated").is_err());
    }
}
