//! Local configuration values kept outside the table system.
//!
//! # Responsibility
//! - Store small per-device preferences (theme, layout, player state).
//! - Define the fixed key allow-list that travels inside backup archives.
//!
//! # Invariants
//! - Only keys in `LOCAL_SETTING_KEYS` are exported or restored.
//! - `set(key, None)` removes the key.

use log::debug;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Keys snapshotted into `local_settings.json` on export.
pub const LOCAL_SETTING_KEYS: &[&str] = &[
    "theme",
    "accent_color",
    "dashboard_layout",
    "default_project_view",
    "music_volume",
    "music_shuffle",
    "last_backup_at",
];

pub fn is_exported_key(key: &str) -> bool {
    LOCAL_SETTING_KEYS.contains(&key)
}

pub type SettingsResult<T> = Result<T, SettingsError>;

#[derive(Debug)]
pub enum SettingsError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, message: String },
    Unavailable(String),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "settings file {} failed: {source}", path.display())
            }
            Self::Parse { path, message } => {
                write!(f, "settings file {} is malformed: {message}", path.display())
            }
            Self::Unavailable(message) => write!(f, "settings unavailable: {message}"),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { .. } | Self::Unavailable(_) => None,
        }
    }
}

/// Key/value storage for local preferences.
pub trait SettingsStore {
    fn get(&self, key: &str) -> SettingsResult<Option<String>>;
    fn set(&mut self, key: &str, value: Option<&str>) -> SettingsResult<()>;

    /// Values of every allow-listed key; absent keys map to `None`.
    fn snapshot(&self) -> SettingsResult<BTreeMap<String, Option<String>>> {
        LOCAL_SETTING_KEYS
            .iter()
            .map(|key| Ok((key.to_string(), self.get(key)?)))
            .collect()
    }
}

/// In-process settings; nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: BTreeMap<String, String>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> SettingsResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Option<&str>) -> SettingsResult<()> {
        match value {
            Some(value) => self.values.insert(key.to_string(), value.to_string()),
            None => self.values.remove(key),
        };
        Ok(())
    }
}

/// Settings persisted as one flat JSON object on disk.
///
/// Every `set` rewrites the file through a sibling temp file and rename.
#[derive(Debug, Clone)]
pub struct FileSettings {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileSettings {
    /// Loads `path`; a missing file yields empty settings.
    pub fn open(path: impl Into<PathBuf>) -> SettingsResult<Self> {
        let path = path.into();
        let values: BTreeMap<String, String> = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|err| SettingsError::Parse {
                path: path.clone(),
                message: err.to_string(),
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(SettingsError::Io { path, source }),
        };
        debug!(
            "event=settings_open module=settings status=ok keys={}",
            values.len()
        );
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> SettingsResult<()> {
        let io_err = |source: io::Error| SettingsError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(&self.values).map_err(|err| {
            SettingsError::Parse {
                path: self.path.clone(),
                message: err.to_string(),
            }
        })?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, text).map_err(io_err)?;
        fs::rename(&staging, &self.path).map_err(io_err)
    }
}

impl SettingsStore for FileSettings {
    fn get(&self, key: &str) -> SettingsResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Option<&str>) -> SettingsResult<()> {
        match value {
            Some(value) => self.values.insert(key.to_string(), value.to_string()),
            None => self.values.remove(key),
        };
        self.persist()
    }
}
