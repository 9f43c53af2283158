//! Schema ledger: ordered, append-only list of schema versions.
//!
//! # Responsibility
//! - Collect per-version table deltas and optional upgrade routines.
//! - Resolve the effective table set at any version.
//!
//! # Invariants
//! - Versions are strictly increasing and start at 1.
//! - A later delta for a table replaces that table's declaration.
//! - A table's primary key never changes once declared.
//! - Released versions are never edited; new behavior gets a new version.

use super::index_spec::{is_valid_identifier, IndexSpec};
use super::UpgradeContext;
use crate::db::catalog::{FieldKind, SerializationPolicy, TableScope};
use crate::db::table::StoreError;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One-time data transformation run inside the version's transaction.
pub type UpgradeFn = fn(&UpgradeContext<'_>) -> Result<(), UpgradeError>;

/// Errors raised while declaring ledger versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    InvalidIndexSpec {
        spec: String,
        reason: String,
    },
    InvalidTableName(String),
    InvalidFieldName {
        table: String,
        field: String,
    },
    ZeroVersion,
    NonIncreasingVersion {
        previous: u32,
        next: u32,
    },
    DuplicateTableDelta {
        version: u32,
        table: String,
    },
    PrimaryKeyChanged {
        version: u32,
        table: String,
    },
    DropOfUnknownTable {
        version: u32,
        table: String,
    },
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIndexSpec { spec, reason } => {
                write!(f, "invalid index spec `{spec}`: {reason}")
            }
            Self::InvalidTableName(name) => write!(f, "invalid table name `{name}`"),
            Self::InvalidFieldName { table, field } => {
                write!(f, "invalid field name `{field}` declared on table `{table}`")
            }
            Self::ZeroVersion => write!(f, "schema versions start at 1"),
            Self::NonIncreasingVersion { previous, next } => write!(
                f,
                "schema version {next} must be greater than previous version {previous}"
            ),
            Self::DuplicateTableDelta { version, table } => write!(
                f,
                "schema version {version} declares table `{table}` more than once"
            ),
            Self::PrimaryKeyChanged { version, table } => write!(
                f,
                "schema version {version} changes the primary key of table `{table}`"
            ),
            Self::DropOfUnknownTable { version, table } => write!(
                f,
                "schema version {version} drops unknown table `{table}`"
            ),
        }
    }
}

impl Error for LedgerError {}

/// Failure reported by an upgrade routine.
#[derive(Debug)]
pub enum UpgradeError {
    Store(StoreError),
    InvalidData(String),
}

impl Display for UpgradeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "{message}"),
        }
    }
}

impl Error for UpgradeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<StoreError> for UpgradeError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Full declaration of one table at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDecl {
    pub(crate) index_spec: IndexSpec,
    pub(crate) scope: Option<TableScope>,
    pub(crate) policy: SerializationPolicy,
    pub(crate) fields: BTreeMap<String, FieldKind>,
}

impl TableDecl {
    /// Parses the index spec; see `index_spec` for the syntax.
    pub fn parse(index_spec: &str) -> Result<Self, LedgerError> {
        Ok(Self {
            index_spec: IndexSpec::parse(index_spec)?,
            scope: None,
            policy: SerializationPolicy::Include,
            fields: BTreeMap::new(),
        })
    }

    /// Declares every row as owned by one root entity.
    pub fn scoped(mut self) -> Self {
        self.scope = Some(TableScope::Scoped);
        self
    }

    /// Declares the table as root-level even if it indexes `project_id`.
    pub fn global(mut self) -> Self {
        self.scope = Some(TableScope::Global);
        self
    }

    /// Keeps the table out of backup archives (derived/cache data).
    pub fn exclude_from_backup(mut self) -> Self {
        self.policy = SerializationPolicy::Exclude;
        self
    }

    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.insert(name.to_string(), kind);
        self
    }

    pub fn index_spec(&self) -> &IndexSpec {
        &self.index_spec
    }
}

/// Change applied to one table by one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableDelta {
    Define(TableDecl),
    Drop,
}

/// One entry of the ledger.
#[derive(Clone)]
pub struct SchemaVersion {
    pub(crate) version: u32,
    pub(crate) deltas: BTreeMap<String, TableDelta>,
    pub(crate) upgrade: Option<UpgradeFn>,
}

impl std::fmt::Debug for SchemaVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaVersion")
            .field("version", &self.version)
            .field("deltas", &self.deltas)
            .field("has_upgrade", &self.upgrade.is_some())
            .finish()
    }
}

impl SchemaVersion {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn deltas(&self) -> &BTreeMap<String, TableDelta> {
        &self.deltas
    }

    pub fn has_upgrade(&self) -> bool {
        self.upgrade.is_some()
    }
}

/// Ordered sequence of schema versions plus the root table name.
#[derive(Debug, Clone)]
pub struct SchemaLedger {
    root_table: String,
    versions: Vec<SchemaVersion>,
}

impl SchemaLedger {
    /// Creates an empty ledger whose top-level entity table is `root_table`.
    pub fn new(root_table: impl Into<String>) -> Self {
        Self {
            root_table: root_table.into(),
            versions: Vec::new(),
        }
    }

    /// Appends one version.
    ///
    /// # Errors
    /// - Version is zero or not greater than the last declared version.
    /// - A table name or declared field name is not a valid identifier.
    /// - A table appears twice, is dropped without existing, or changes its
    ///   primary key.
    pub fn declare_version<I, N>(
        &mut self,
        version: u32,
        deltas: I,
        upgrade: Option<UpgradeFn>,
    ) -> Result<&mut Self, LedgerError>
    where
        I: IntoIterator<Item = (N, TableDelta)>,
        N: Into<String>,
    {
        if version == 0 {
            return Err(LedgerError::ZeroVersion);
        }
        let previous = self.latest_version();
        if version <= previous {
            return Err(LedgerError::NonIncreasingVersion {
                previous,
                next: version,
            });
        }

        let existing = self.tables_at(previous);
        let mut collected = BTreeMap::new();
        for (name, delta) in deltas {
            let name = name.into();
            if !is_valid_identifier(&name) {
                return Err(LedgerError::InvalidTableName(name));
            }
            match (&delta, existing.get(&name)) {
                (TableDelta::Define(decl), Some(current)) => {
                    if decl.index_spec.primary_key != current.index_spec.primary_key {
                        return Err(LedgerError::PrimaryKeyChanged {
                            version,
                            table: name,
                        });
                    }
                }
                (TableDelta::Drop, None) => {
                    return Err(LedgerError::DropOfUnknownTable {
                        version,
                        table: name,
                    });
                }
                _ => {}
            }
            if let TableDelta::Define(decl) = &delta {
                if let Some(field) = decl.fields.keys().find(|field| !is_valid_identifier(field)) {
                    return Err(LedgerError::InvalidFieldName {
                        table: name,
                        field: field.clone(),
                    });
                }
            }
            if collected.insert(name.clone(), delta).is_some() {
                return Err(LedgerError::DuplicateTableDelta {
                    version,
                    table: name,
                });
            }
        }

        self.versions.push(SchemaVersion {
            version,
            deltas: collected,
            upgrade,
        });
        Ok(self)
    }

    pub fn root_table(&self) -> &str {
        &self.root_table
    }

    /// Latest declared version, or `0` for an empty ledger.
    pub fn latest_version(&self) -> u32 {
        self.versions.last().map_or(0, |entry| entry.version)
    }

    pub fn versions(&self) -> &[SchemaVersion] {
        &self.versions
    }

    /// Effective table declarations after applying every delta `<= version`.
    pub fn tables_at(&self, version: u32) -> BTreeMap<String, TableDecl> {
        let mut tables = BTreeMap::new();
        for entry in self.versions.iter().take_while(|entry| entry.version <= version) {
            for (name, delta) in &entry.deltas {
                match delta {
                    TableDelta::Define(decl) => {
                        tables.insert(name.clone(), decl.clone());
                    }
                    TableDelta::Drop => {
                        tables.remove(name);
                    }
                }
            }
        }
        tables
    }

    /// Ledger truncated to versions `<= max_version`.
    pub fn up_to(&self, max_version: u32) -> Self {
        Self {
            root_table: self.root_table.clone(),
            versions: self
                .versions
                .iter()
                .take_while(|entry| entry.version <= max_version)
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LedgerError, SchemaLedger, TableDecl, TableDelta};
    use crate::db::catalog::FieldKind;

    fn define(spec: &str) -> TableDelta {
        TableDelta::Define(TableDecl::parse(spec).unwrap())
    }

    #[test]
    fn versions_must_strictly_increase() {
        let mut ledger = SchemaLedger::new("projects");
        ledger
            .declare_version(1, [("projects", define("++id"))], None)
            .unwrap();

        let err = ledger
            .declare_version(1, [("tasks", define("++id"))], None)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::NonIncreasingVersion {
                previous: 1,
                next: 1
            }
        );
        assert_eq!(
            ledger
                .declare_version(0, Vec::<(&str, TableDelta)>::new(), None)
                .unwrap_err(),
            LedgerError::ZeroVersion
        );
    }

    #[test]
    fn effective_tables_follow_latest_delta_and_drops() {
        let mut ledger = SchemaLedger::new("projects");
        ledger
            .declare_version(
                1,
                [
                    ("projects", define("++id, status")),
                    ("scratch", define("++id")),
                ],
                None,
            )
            .unwrap()
            .declare_version(
                2,
                [
                    ("projects", define("++id, status, category")),
                    ("scratch", TableDelta::Drop),
                ],
                None,
            )
            .unwrap();

        let v1 = ledger.tables_at(1);
        assert!(v1.contains_key("scratch"));
        assert_eq!(v1["projects"].index_spec().indexes.len(), 1);

        let v2 = ledger.tables_at(2);
        assert!(!v2.contains_key("scratch"));
        assert_eq!(v2["projects"].index_spec().indexes.len(), 2);
    }

    #[test]
    fn primary_key_cannot_change_between_versions() {
        let mut ledger = SchemaLedger::new("projects");
        ledger
            .declare_version(1, [("settings", define("key"))], None)
            .unwrap();
        let err = ledger
            .declare_version(2, [("settings", define("++id"))], None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::PrimaryKeyChanged { version: 2, .. }));
    }

    #[test]
    fn dropping_unknown_table_is_rejected() {
        let mut ledger = SchemaLedger::new("projects");
        let err = ledger
            .declare_version(1, [("ghost", TableDelta::Drop)], None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::DropOfUnknownTable { .. }));
    }

    #[test]
    fn invalid_table_names_are_rejected() {
        let mut ledger = SchemaLedger::new("projects");
        let err = ledger
            .declare_version(1, [("Projects; DROP", define("++id"))], None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTableName(_)));
    }

    #[test]
    fn up_to_truncates_versions() {
        let mut ledger = SchemaLedger::new("projects");
        ledger
            .declare_version(1, [("projects", define("++id"))], None)
            .unwrap()
            .declare_version(
                2,
                [(
                    "goals",
                    TableDelta::Define(
                        TableDecl::parse("++id")
                            .unwrap()
                            .field("target_date", FieldKind::Date),
                    ),
                )],
                None,
            )
            .unwrap();

        let truncated = ledger.up_to(1);
        assert_eq!(truncated.latest_version(), 1);
        assert!(!truncated.tables_at(5).contains_key("goals"));
        assert_eq!(truncated.root_table(), "projects");
    }
}
