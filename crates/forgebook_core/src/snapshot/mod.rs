//! Portable snapshot of every backed-up table plus local settings.
//!
//! # Responsibility
//! - Serialize table rows into a JSON manifest with externalized binaries.
//! - Validate and decode a manifest back into typed rows.
//!
//! # Invariants
//! - A bundle lives only for one export or import call.
//! - Manifest validation completes before any caller mutates storage.
//! - Binary values round-trip byte-exact; dates survive to the millisecond.

pub mod assets;
pub mod export;
pub mod import;

use crate::db::StoreError;
use crate::model::value::Record;
use crate::settings::SettingsError;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use export::serialize;
pub use import::{deserialize, DecodedSnapshot};

/// Manifest row: one JSON object per stored record.
pub type ManifestRow = Map<String, Json>;
/// `{ table: [row, ...] }` as written to `database_dump.json`.
pub type Manifest = BTreeMap<String, Vec<ManifestRow>>;
/// Decoded rows per table, ready for bulk insertion.
pub type TableRows = BTreeMap<String, Vec<Record>>;
pub type LocalSettings = BTreeMap<String, Option<String>>;

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug)]
pub enum CodecError {
    Store(StoreError),
    Settings(SettingsError),
    /// Manifest is missing, unparsable, or has the wrong shape.
    ManifestCorrupt(String),
    LocalSettingsCorrupt(String),
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Settings(err) => write!(f, "{err}"),
            Self::ManifestCorrupt(message) => write!(f, "backup manifest is corrupt: {message}"),
            Self::LocalSettingsCorrupt(message) => {
                write!(f, "backup local settings are corrupt: {message}")
            }
        }
    }
}

impl Error for CodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Settings(err) => Some(err),
            Self::ManifestCorrupt(_) | Self::LocalSettingsCorrupt(_) => None,
        }
    }
}

impl From<StoreError> for CodecError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<SettingsError> for CodecError {
    fn from(value: SettingsError) -> Self {
        Self::Settings(value)
    }
}

/// Transient export/import payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotBundle {
    pub manifest: Manifest,
    /// Asset bytes keyed by archive path (`<table>/<rowId>_<field>.<ext>`).
    pub assets: BTreeMap<String, Vec<u8>>,
    pub local_settings: LocalSettings,
}

impl SnapshotBundle {
    pub fn row_count(&self) -> usize {
        self.manifest.values().map(Vec::len).sum()
    }
}

/// Parses and shape-checks a manifest document.
///
/// The top level must be an object of arrays of objects; anything else is
/// `ManifestCorrupt`.
pub fn parse_manifest(bytes: &[u8]) -> CodecResult<Manifest> {
    let parsed: Json = serde_json::from_slice(bytes)
        .map_err(|err| CodecError::ManifestCorrupt(err.to_string()))?;
    let Json::Object(tables) = parsed else {
        return Err(CodecError::ManifestCorrupt(
            "top level is not an object".to_string(),
        ));
    };

    let mut manifest = Manifest::new();
    for (table, rows) in tables {
        let Json::Array(rows) = rows else {
            return Err(CodecError::ManifestCorrupt(format!(
                "table `{table}` is not an array"
            )));
        };
        let mut parsed_rows = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            match row {
                Json::Object(fields) => parsed_rows.push(fields),
                _ => {
                    return Err(CodecError::ManifestCorrupt(format!(
                        "row {index} of table `{table}` is not an object"
                    )))
                }
            }
        }
        manifest.insert(table, parsed_rows);
    }
    Ok(manifest)
}

/// Parses `local_settings.json`: an object of string or null values.
pub fn parse_local_settings(bytes: &[u8]) -> CodecResult<LocalSettings> {
    serde_json::from_slice(bytes).map_err(|err| CodecError::LocalSettingsCorrupt(err.to_string()))
}
