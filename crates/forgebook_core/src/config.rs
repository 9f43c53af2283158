//! Runtime configuration for core hosts.
//!
//! # Responsibility
//! - Load optional JSON configuration with per-field defaults.
//! - Resolve every directory to an absolute path before use.
//!
//! # Invariants
//! - Relative directories resolve against the config file's directory, or
//!   the working directory when no file is given.
//! - `FORGEBOOK_DATA_DIR` overrides `data_dir` when set and non-empty.

use serde::Deserialize;
use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "FORGEBOOK_DATA_DIR";

fn default_data_dir() -> PathBuf {
    PathBuf::from("forgebook-data")
}

fn default_db_file_name() -> String {
    "forgebook.sqlite3".to_string()
}

fn default_settings_file_name() -> String {
    "local_settings.json".to_string()
}

fn default_log_level() -> String {
    crate::logging::default_log_level().to_string()
}

/// Raw configuration as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_db_file_name")]
    pub db_file_name: String,
    #[serde(default = "default_settings_file_name")]
    pub settings_file_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Defaults to `<data_dir>/logs`.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Defaults to `<data_dir>/backups`.
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file_name: default_db_file_name(),
            settings_file_name: default_settings_file_name(),
            log_level: default_log_level(),
            log_dir: None,
            backup_dir: None,
        }
    }
}

/// Configuration with every path made absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub settings_path: PathBuf,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub backup_dir: PathBuf,
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid config {}: {source}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

impl CoreConfig {
    /// Reads `path` when given, otherwise starts from defaults, then applies
    /// the environment and resolves paths.
    pub fn load(path: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
        let (config, base_dir) = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                let config = Self::from_json(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
                let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
                (config, base)
            }
            None => (Self::default(), PathBuf::new()),
        };
        let base_dir = absolutize(&base_dir)?;
        config.resolve(&base_dir, |key| env::var(key).ok())
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Applies environment overrides and resolves paths against `base_dir`.
    ///
    /// `lookup` reads environment variables; tests pass a closure instead
    /// of mutating the process environment.
    pub fn resolve(
        &self,
        base_dir: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ResolvedConfig, ConfigError> {
        for (name, value) in [
            ("db_file_name", &self.db_file_name),
            ("settings_file_name", &self.settings_file_name),
        ] {
            if !is_plain_file_name(value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a plain file name, got `{value}`"
                )));
            }
        }

        let data_dir = match lookup(DATA_DIR_ENV) {
            Some(raw) if !raw.trim().is_empty() => PathBuf::from(raw.trim()),
            _ => self.data_dir.clone(),
        };
        let data_dir = base_dir.join(data_dir);
        let resolve_dir = |dir: &Option<PathBuf>, fallback: &str| match dir {
            Some(dir) => base_dir.join(dir),
            None => data_dir.join(fallback),
        };

        Ok(ResolvedConfig {
            db_path: data_dir.join(&self.db_file_name),
            settings_path: data_dir.join(&self.settings_file_name),
            log_level: self.log_level.clone(),
            log_dir: resolve_dir(&self.log_dir, "logs"),
            backup_dir: resolve_dir(&self.backup_dir, "backups"),
            data_dir,
        })
    }
}

fn is_plain_file_name(value: &str) -> bool {
    let path = Path::new(value);
    !value.trim().is_empty()
        && path.file_name().and_then(|name| name.to_str()) == Some(value)
}

fn absolutize(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().map_err(|source| ConfigError::Io {
        path: PathBuf::from("."),
        source,
    })?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig, DATA_DIR_ENV};
    use std::path::{Path, PathBuf};

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = CoreConfig::from_json(r#"{"log_level": "warn"}"#).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.db_file_name, "forgebook.sqlite3");
        assert_eq!(config.log_dir, None);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(CoreConfig::from_json(r#"{"data_dri": "x"}"#).is_err());
    }

    #[test]
    fn relative_dirs_resolve_against_base_dir() {
        let config = CoreConfig::from_json(r#"{"data_dir": "data", "backup_dir": "/srv/backups"}"#)
            .unwrap();
        let resolved = config.resolve(Path::new("/etc/forgebook"), |_| None).unwrap();

        assert_eq!(resolved.data_dir, PathBuf::from("/etc/forgebook/data"));
        assert_eq!(
            resolved.db_path,
            PathBuf::from("/etc/forgebook/data/forgebook.sqlite3")
        );
        assert_eq!(resolved.log_dir, PathBuf::from("/etc/forgebook/data/logs"));
        assert_eq!(resolved.backup_dir, PathBuf::from("/srv/backups"));
    }

    #[test]
    fn environment_overrides_data_dir() {
        let resolved = CoreConfig::default()
            .resolve(Path::new("/home/maker"), |key| {
                (key == DATA_DIR_ENV).then(|| "/mnt/workshop".to_string())
            })
            .unwrap();
        assert_eq!(resolved.data_dir, PathBuf::from("/mnt/workshop"));
        assert_eq!(
            resolved.settings_path,
            PathBuf::from("/mnt/workshop/local_settings.json")
        );
    }

    #[test]
    fn file_names_cannot_contain_directories() {
        let config = CoreConfig::from_json(r#"{"db_file_name": "../escape.db"}"#).unwrap();
        assert!(matches!(
            config.resolve(Path::new("/tmp"), |_| None),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn load_reads_file_relative_to_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forgebook.json");
        std::fs::write(&path, r#"{"data_dir": "store"}"#).unwrap();

        let resolved = CoreConfig::load(Some(&path)).unwrap();
        if std::env::var(DATA_DIR_ENV).is_err() {
            assert_eq!(resolved.data_dir, dir.path().join("store"));
        }
    }
}
