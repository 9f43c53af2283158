//! Blob reference placeholders and asset path naming.

use serde_json::{Map, Value as Json};

pub const BLOB_REFERENCE_KIND: &str = "blob_reference";
const KIND_KEY: &str = "kind";
const PATH_KEY: &str = "path";
const MIME_KEY: &str = "mimeType";

/// Reference written in place of a binary field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobReference {
    pub path: String,
    pub mime_type: String,
}

impl BlobReference {
    pub fn to_json(&self) -> Json {
        let mut map = Map::new();
        map.insert(KIND_KEY.to_string(), Json::from(BLOB_REFERENCE_KIND));
        map.insert(PATH_KEY.to_string(), Json::from(self.path.as_str()));
        map.insert(MIME_KEY.to_string(), Json::from(self.mime_type.as_str()));
        Json::Object(map)
    }

    /// Recognizes a placeholder object; other objects return `None`.
    pub fn from_json(map: &Map<String, Json>) -> Option<Self> {
        if map.get(KIND_KEY)?.as_str()? != BLOB_REFERENCE_KIND {
            return None;
        }
        Some(Self {
            path: map.get(PATH_KEY)?.as_str()?.to_string(),
            mime_type: map.get(MIME_KEY)?.as_str()?.to_string(),
        })
    }
}

/// File extension for a media type; unknown types fall back to `bin`.
pub fn extension_for_mime(mime_type: &str) -> &str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        "application/pdf" => "pdf",
        "application/json" => "json",
        "text/plain" => "txt",
        "text/markdown" => "md",
        _ => match essence.split_once('/') {
            Some((_, subtype))
                if !subtype.is_empty()
                    && subtype.len() <= 8
                    && subtype.bytes().all(|b| b.is_ascii_alphanumeric()) =>
            {
                subtype
            }
            _ => "bin",
        },
    }
}

/// Deterministic archive path `<table>/<rowId>_<field>.<ext>`.
///
/// Row ids and field paths are reduced to `[A-Za-z0-9_.-]` so natural keys
/// cannot escape the table directory.
pub fn asset_path(table: &str, row_id: &str, field: &str, mime_type: &str) -> String {
    format!(
        "{table}/{}_{}.{}",
        sanitize_segment(row_id),
        sanitize_segment(field),
        extension_for_mime(mime_type)
    )
}

fn sanitize_segment(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}
