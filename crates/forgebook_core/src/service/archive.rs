//! Zip packaging of snapshot bundles.
//!
//! Archive layout:
//! - `database_dump.json`: `{ table: [row, ...] }`
//! - `<table>/<rowId>_<field>.<ext>`: raw asset bytes
//! - `local_settings.json`: `{ key: string | null }`

use super::backup_service::{BackupError, BackupResult};
use crate::snapshot::{parse_local_settings, parse_manifest, CodecError, SnapshotBundle};
use log::warn;
use std::io::{Cursor, Read, Write};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const MANIFEST_FILE: &str = "database_dump.json";
pub const LOCAL_SETTINGS_FILE: &str = "local_settings.json";

/// Writes a bundle into an in-memory zip archive.
pub fn pack(bundle: &SnapshotBundle) -> BackupResult<Vec<u8>> {
    let manifest = serde_json::to_vec_pretty(&bundle.manifest).map_err(BackupError::Encode)?;
    let settings =
        serde_json::to_vec_pretty(&bundle.local_settings).map_err(BackupError::Encode)?;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    write_entry(&mut writer, MANIFEST_FILE, &manifest, options)?;
    for (path, bytes) in &bundle.assets {
        write_entry(&mut writer, path, bytes, options)?;
    }
    write_entry(&mut writer, LOCAL_SETTINGS_FILE, &settings, options)?;

    let finished = writer.finish()?;
    Ok(finished.into_inner())
}

/// Reads and validates an archive without side effects.
///
/// # Errors
/// - `BackupError::Zip` when the bytes are not a readable zip archive.
/// - `CodecError::ManifestCorrupt` when the manifest is missing or malformed.
///
/// Unreadable local settings only log a warning and restore nothing.
pub fn unpack(bytes: &[u8]) -> BackupResult<SnapshotBundle> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut manifest_bytes = None;
    let mut settings_bytes = None;
    let mut bundle = SnapshotBundle::default();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).map_err(ZipError::Io)?;
        match name.as_str() {
            MANIFEST_FILE => manifest_bytes = Some(content),
            LOCAL_SETTINGS_FILE => settings_bytes = Some(content),
            _ => {
                bundle.assets.insert(name, content);
            }
        }
    }

    let manifest_bytes = manifest_bytes.ok_or_else(|| {
        CodecError::ManifestCorrupt(format!("archive has no `{MANIFEST_FILE}`"))
    })?;
    bundle.manifest = parse_manifest(&manifest_bytes)?;

    if let Some(settings_bytes) = settings_bytes {
        match parse_local_settings(&settings_bytes) {
            Ok(settings) => bundle.local_settings = settings,
            Err(err) => warn!(
                "event=backup_unpack module=backup status=degraded error_code=local_settings_corrupt error={}",
                err
            ),
        }
    }
    Ok(bundle)
}

fn write_entry(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: &str,
    bytes: &[u8],
    options: SimpleFileOptions,
) -> BackupResult<()> {
    writer.start_file(name, options)?;
    writer.write_all(bytes).map_err(ZipError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{pack, unpack, MANIFEST_FILE};
    use crate::service::backup_service::BackupError;
    use crate::snapshot::{parse_manifest, CodecError, SnapshotBundle};
    use std::collections::BTreeMap;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    #[test]
    fn pack_then_unpack_keeps_manifest_assets_and_settings() {
        let bundle = SnapshotBundle {
            manifest: parse_manifest(br#"{"projects":[{"id":1,"title":"Lathe"}]}"#).unwrap(),
            assets: BTreeMap::from([("documents/1_file.pdf".to_string(), b"%PDF".to_vec())]),
            local_settings: BTreeMap::from([
                ("theme".to_string(), Some("dark".to_string())),
                ("music_volume".to_string(), None),
            ]),
        };

        let unpacked = unpack(&pack(&bundle).unwrap()).unwrap();
        assert_eq!(unpacked, bundle);
    }

    #[test]
    fn archive_without_manifest_is_corrupt() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("local_settings.json", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"{}").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert!(matches!(
            unpack(&bytes),
            Err(BackupError::Codec(CodecError::ManifestCorrupt(_)))
        ));
    }

    #[test]
    fn truncated_manifest_entry_is_corrupt() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(MANIFEST_FILE, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(br#"{"projects":[{"id":1,"tit"#).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert!(matches!(
            unpack(&bytes),
            Err(BackupError::Codec(CodecError::ManifestCorrupt(_)))
        ));
    }

    #[test]
    fn non_zip_bytes_are_rejected() {
        assert!(matches!(unpack(b"not a zip"), Err(BackupError::Zip(_))));
    }
}
