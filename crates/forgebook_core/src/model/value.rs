//! Dynamic document values stored in every table.
//!
//! # Responsibility
//! - Define the field value shape shared by all tables (`Value`, `Record`).
//! - Own date precision and ISO-8601 formatting rules.
//!
//! # Invariants
//! - Date values carry millisecond precision; finer precision is dropped.
//! - ISO output always uses UTC with a `Z` suffix and three fractional digits.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use rusqlite::types::{ToSql, ToSqlOutput};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// UTC instant used for every date-valued field.
pub type Timestamp = DateTime<Utc>;

/// Binary field payload together with its declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Blob {
    pub fn new(mime_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// One field value inside a stored document.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Date(Timestamp),
    Blob(Blob),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Builds a date value truncated to millisecond precision.
    pub fn date(value: Timestamp) -> Self {
        Self::Date(truncate_to_millis(value))
    }

    /// Builds a date value from epoch milliseconds.
    pub fn date_from_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self::Date)
    }

    pub fn blob(mime_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::Blob(Blob::new(mime_type, bytes))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&Timestamp> {
        match self {
            Self::Date(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Blob(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Timestamp> for Value {
    fn from(value: Timestamp) -> Self {
        Self::date(value)
    }
}

impl From<Blob> for Value {
    fn from(value: Blob) -> Self {
        Self::Blob(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One row of any table: an ordered map of field name to value.
///
/// The primary key is an ordinary field of the record (for example `id`),
/// filled in by the store on insert when the table auto-assigns keys.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert used heavily by callers and tests.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Primary key of one row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    /// Auto-assigned integer key (`++field` tables).
    Int(i64),
    /// Natural string key (for example `settings.key`).
    Text(String),
}

impl RowKey {
    /// Reads a key from a field value; only integers and strings qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(id) => Some(Self::Int(*id)),
            Value::Text(text) => Some(Self::Text(text.clone())),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Int(id) => Value::Integer(id),
            Self::Text(text) => Value::Text(text),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(id) => Some(*id),
            Self::Text(_) => None,
        }
    }
}

impl Display for RowKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(text) => write!(f, "{text}"),
        }
    }
}

impl From<i64> for RowKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RowKey {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl ToSql for RowKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Int(id) => Ok(ToSqlOutput::from(*id)),
            Self::Text(text) => Ok(ToSqlOutput::from(text.as_str())),
        }
    }
}

/// Drops sub-millisecond precision from a timestamp.
pub fn truncate_to_millis(value: Timestamp) -> Timestamp {
    Utc.timestamp_millis_opt(value.timestamp_millis())
        .single()
        .unwrap_or(value)
}

/// Formats a timestamp as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn format_iso_millis(value: &Timestamp) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an ISO-8601 date or date-time string.
///
/// Accepts full RFC 3339 date-times (any offset, normalized to UTC) and bare
/// `YYYY-MM-DD` dates (midnight UTC). Returns `None` for anything else.
pub fn parse_iso_date(text: &str) -> Option<Timestamp> {
    let trimmed = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(truncate_to_millis(parsed.with_timezone(&Utc)));
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::{format_iso_millis, parse_iso_date, Record, RowKey, Value};
    use chrono::{TimeZone, Timelike, Utc};

    #[test]
    fn date_values_drop_sub_millisecond_precision() {
        let precise = Utc
            .with_ymd_and_hms(2024, 3, 9, 10, 30, 0)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        let value = Value::date(precise);
        let stored = value.as_date().unwrap();
        assert_eq!(stored.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn iso_format_matches_millisecond_zulu_shape() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_iso_millis(&ts), "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn parse_iso_date_accepts_offsets_and_bare_dates() {
        let with_offset = parse_iso_date("2024-01-01T02:00:00.000+02:00").unwrap();
        assert_eq!(
            with_offset,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );

        let bare = parse_iso_date("2024-05-17").unwrap();
        assert_eq!(bare, Utc.with_ymd_and_hms(2024, 5, 17, 0, 0, 0).unwrap());

        assert!(parse_iso_date("next tuesday").is_none());
        assert!(parse_iso_date("").is_none());
    }

    #[test]
    fn row_key_reads_only_integers_and_text() {
        assert_eq!(RowKey::from_value(&Value::Integer(4)), Some(RowKey::Int(4)));
        assert_eq!(
            RowKey::from_value(&Value::from("theme")),
            Some(RowKey::Text("theme".to_string()))
        );
        assert_eq!(RowKey::from_value(&Value::Bool(true)), None);
    }

    #[test]
    fn record_builder_keeps_fields_sorted() {
        let record = Record::new().with("title", "Bench").with("id", 3_i64);
        let names: Vec<&str> = record.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["id", "title"]);
        assert_eq!(record.get_i64("id"), Some(3));
    }
}
