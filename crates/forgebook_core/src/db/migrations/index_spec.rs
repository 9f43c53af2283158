//! Index-spec mini-language used by ledger table declarations.
//!
//! A spec is a comma-separated list. The first entry names the primary key:
//! `++id` is an auto-incrementing integer key, a bare `key` is a natural
//! string key. Every following entry is an indexed field; a leading `&`
//! makes the index unique.
//!
//! ```text
//! "++id, project_id, status, &slug"
//! "key"
//! ```

use super::ledger::LedgerError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::str::FromStr;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid identifier regex"));

/// Returns whether `name` is usable as a table or indexed field name.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Integer key assigned by the store when absent on insert.
    AutoIncrement,
    /// String key always supplied by the caller.
    Natural,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    pub field: String,
    pub kind: KeyKind,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexDef {
    pub field: String,
    pub unique: bool,
}

impl IndexDef {
    /// SQLite object name for this index on `table`.
    pub fn sql_name(&self, table: &str) -> String {
        if self.unique {
            format!("uidx_{table}_{}", self.field)
        } else {
            format!("idx_{table}_{}", self.field)
        }
    }
}

/// Parsed primary key plus secondary indexes of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub primary_key: PrimaryKey,
    pub indexes: Vec<IndexDef>,
}

impl IndexSpec {
    pub fn parse(spec: &str) -> Result<Self, LedgerError> {
        let invalid = |reason: String| LedgerError::InvalidIndexSpec {
            spec: spec.to_string(),
            reason,
        };

        let mut entries = spec.split(',').map(str::trim);
        let first = entries
            .next()
            .filter(|entry| !entry.is_empty())
            .ok_or_else(|| invalid("missing primary key".to_string()))?;

        let primary_key = if let Some(field) = first.strip_prefix("++") {
            PrimaryKey {
                field: field.to_string(),
                kind: KeyKind::AutoIncrement,
            }
        } else if first.starts_with('&') {
            return Err(invalid("primary key cannot carry `&`".to_string()));
        } else {
            PrimaryKey {
                field: first.to_string(),
                kind: KeyKind::Natural,
            }
        };
        if !is_valid_identifier(&primary_key.field) {
            return Err(invalid(format!(
                "invalid primary key name `{}`",
                primary_key.field
            )));
        }

        let mut seen = BTreeSet::new();
        let mut indexes = Vec::new();
        for entry in entries {
            if entry.is_empty() {
                return Err(invalid("empty index entry".to_string()));
            }
            if entry.starts_with("++") {
                return Err(invalid(format!(
                    "`{entry}`: only the primary key may auto-increment"
                )));
            }
            let (field, unique) = match entry.strip_prefix('&') {
                Some(field) => (field, true),
                None => (entry, false),
            };
            if !is_valid_identifier(field) {
                return Err(invalid(format!("invalid index field `{field}`")));
            }
            if field == primary_key.field {
                return Err(invalid(format!(
                    "`{field}` is already the primary key"
                )));
            }
            if !seen.insert(field.to_string()) {
                return Err(invalid(format!("duplicate index field `{field}`")));
            }
            indexes.push(IndexDef {
                field: field.to_string(),
                unique,
            });
        }

        Ok(Self {
            primary_key,
            indexes,
        })
    }

    /// Names of all secondary indexed fields.
    pub fn indexed_fields(&self) -> BTreeSet<String> {
        self.indexes.iter().map(|index| index.field.clone()).collect()
    }
}

impl FromStr for IndexSpec {
    type Err = LedgerError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        Self::parse(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::{is_valid_identifier, IndexDef, IndexSpec, KeyKind};

    #[test]
    fn parses_auto_key_with_plain_and_unique_indexes() {
        let spec = IndexSpec::parse("++id, project_id, &slug").unwrap();
        assert_eq!(spec.primary_key.field, "id");
        assert_eq!(spec.primary_key.kind, KeyKind::AutoIncrement);
        assert_eq!(
            spec.indexes,
            vec![
                IndexDef {
                    field: "project_id".to_string(),
                    unique: false,
                },
                IndexDef {
                    field: "slug".to_string(),
                    unique: true,
                },
            ]
        );
    }

    #[test]
    fn parses_natural_key_without_indexes() {
        let spec: IndexSpec = "key".parse().unwrap();
        assert_eq!(spec.primary_key.kind, KeyKind::Natural);
        assert!(spec.indexes.is_empty());
    }

    #[test]
    fn rejects_malformed_specs() {
        for bad in [
            "",
            "++id,,status",
            "&id",
            "++id, ++other",
            "++id, id",
            "++id, status, status",
            "++id, Status",
            "++id, project-id",
        ] {
            assert!(IndexSpec::parse(bad).is_err(), "`{bad}` should be rejected");
        }
    }

    #[test]
    fn identifiers_are_lower_snake_case() {
        assert!(is_valid_identifier("project_images"));
        assert!(is_valid_identifier("_private"));
        assert!(!is_valid_identifier("1table"));
        assert!(!is_valid_identifier("drop table"));
    }

    #[test]
    fn unique_and_plain_indexes_get_distinct_sql_names() {
        let plain = IndexDef {
            field: "slug".to_string(),
            unique: false,
        };
        let unique = IndexDef {
            field: "slug".to_string(),
            unique: true,
        };
        assert_eq!(plain.sql_name("tools"), "idx_tools_slug");
        assert_eq!(unique.sql_name("tools"), "uidx_tools_slug");
    }
}
