//! Table catalog: canonical table list and per-table classification.
//!
//! # Responsibility
//! - Resolve ledger declarations into `TableDescriptor`s once, at open time.
//! - Answer scoped/global and backup-inclusion questions for every consumer
//!   (backup service, external indexers).
//!
//! # Invariants
//! - The root table is always global.
//! - An explicit scope declaration wins over the `project_id` index rule.
//! - Every table in the ledger's effective set has exactly one descriptor.

use super::migrations::index_spec::{KeyKind, PrimaryKey};
use super::migrations::ledger::{SchemaLedger, TableDecl};
use std::collections::{BTreeMap, BTreeSet};

/// Indexed field that marks a table as owned by a root project.
pub const PARENT_REFERENCE_FIELD: &str = "project_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableScope {
    /// Every row belongs to exactly one root entity.
    Scoped,
    /// Root-level rows not owned by another entity.
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializationPolicy {
    #[default]
    Include,
    Exclude,
}

/// Declared kind of one document field.
///
/// On import only `Date` converts values: ISO strings become dates. Any
/// declared kind takes the field out of the date-by-name rule, so a declared
/// `Text`, `Blob`, or `Numeric` field keeps date-shaped strings as text.
/// Binary values are found by value on export and by placeholder on import,
/// whatever the declaration says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
    Blob,
    Numeric,
}

/// Resolved description of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub primary_key: PrimaryKey,
    pub indexed_fields: BTreeSet<String>,
    pub scope: TableScope,
    pub policy: SerializationPolicy,
    pub fields: BTreeMap<String, FieldKind>,
}

impl TableDescriptor {
    fn resolve(name: &str, root_table: &str, decl: &TableDecl) -> Self {
        let indexed_fields = decl.index_spec.indexed_fields();
        let scope = classify(name, root_table, decl.scope, &indexed_fields);
        Self {
            name: name.to_string(),
            primary_key: decl.index_spec.primary_key.clone(),
            indexed_fields,
            scope,
            policy: decl.policy,
            fields: decl.fields.clone(),
        }
    }

    pub fn primary_key_field(&self) -> &str {
        &self.primary_key.field
    }

    pub fn has_auto_key(&self) -> bool {
        self.primary_key.kind == KeyKind::AutoIncrement
    }

    pub fn is_scoped(&self) -> bool {
        self.scope == TableScope::Scoped
    }

    pub fn included_in_backup(&self) -> bool {
        self.policy == SerializationPolicy::Include
    }

    pub fn field_kind(&self, field: &str) -> Option<FieldKind> {
        self.fields.get(field).copied()
    }
}

fn classify(
    name: &str,
    root_table: &str,
    declared: Option<TableScope>,
    indexed_fields: &BTreeSet<String>,
) -> TableScope {
    if name == root_table {
        return TableScope::Global;
    }
    if let Some(scope) = declared {
        return scope;
    }
    if indexed_fields.contains(PARENT_REFERENCE_FIELD) {
        TableScope::Scoped
    } else {
        TableScope::Global
    }
}

/// Canonical set of tables known to the current schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableCatalog {
    root_table: String,
    tables: BTreeMap<String, TableDescriptor>,
}

impl TableCatalog {
    /// Catalog of the ledger's latest version.
    pub fn from_ledger(ledger: &SchemaLedger) -> Self {
        Self::at_version(ledger, ledger.latest_version())
    }

    /// Catalog of the ledger as of `version`.
    pub fn at_version(ledger: &SchemaLedger, version: u32) -> Self {
        let root_table = ledger.root_table().to_string();
        let tables = ledger
            .tables_at(version)
            .iter()
            .map(|(name, decl)| {
                (
                    name.clone(),
                    TableDescriptor::resolve(name, &root_table, decl),
                )
            })
            .collect();
        Self { root_table, tables }
    }

    pub fn root_table(&self) -> &str {
        &self.root_table
    }

    /// All descriptors sorted by table name.
    pub fn list_tables(&self) -> Vec<&TableDescriptor> {
        self.tables.values().collect()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn descriptor(&self, table: &str) -> Option<&TableDescriptor> {
        self.tables.get(table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Unknown tables are reported as not scoped.
    pub fn is_scoped(&self, table: &str) -> bool {
        self.descriptor(table)
            .is_some_and(TableDescriptor::is_scoped)
    }

    /// Descriptors of tables that belong in backup archives.
    pub fn backup_tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables
            .values()
            .filter(|descriptor| descriptor.included_in_backup())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
