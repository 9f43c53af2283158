//! Relationship (link) domain model.
//!
//! # Responsibility
//! - Define the typed, directed edge stored in the `links` table.
//! - Convert between the typed edge and its generic `Record` form.
//!
//! # Invariants
//! - Edges are directed: `source -> target`.
//! - No uniqueness is enforced on `(source, target, relationship)`.

use crate::model::value::{truncate_to_millis, Record, Timestamp, Value};
use chrono::Utc;
use std::collections::BTreeMap;

/// Table that stores relationship records.
pub const LINKS_TABLE: &str = "links";

/// Edge type between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Source must finish before target can proceed.
    Blocks,
    /// Source contributes to target (project -> goal).
    Supports,
    /// Loose association between peers.
    RelatesTo,
    /// Source consumes target (project -> inventory/tool).
    Uses,
    /// Source cites target (log -> document).
    References,
}

impl LinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::Supports => "supports",
            Self::RelatesTo => "relates_to",
            Self::Uses => "uses",
            Self::References => "references",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "blocks" => Some(Self::Blocks),
            "supports" => Some(Self::Supports),
            "relates_to" => Some(Self::RelatesTo),
            "uses" => Some(Self::Uses),
            "references" => Some(Self::References),
            _ => None,
        }
    }
}

/// Typed pointer to one row in one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub entity_type: String,
    pub id: i64,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, id: i64) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
        }
    }
}

/// Directed, typed graph edge between two entities.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Store-assigned id; `None` until persisted.
    pub id: Option<i64>,
    pub source: EntityRef,
    pub target: EntityRef,
    pub relationship: LinkKind,
    pub created_at: Timestamp,
    /// Free-form annotations (for example a note on why a task blocks).
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl Link {
    /// Creates an unsaved edge stamped with the current time.
    pub fn new(source: EntityRef, target: EntityRef, relationship: LinkKind) -> Self {
        Self::at(source, target, relationship, Utc::now())
    }

    /// Creates an unsaved edge with an explicit creation time.
    pub fn at(
        source: EntityRef,
        target: EntityRef,
        relationship: LinkKind,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: None,
            source,
            target,
            relationship,
            created_at: truncate_to_millis(created_at),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("source_type", self.source.entity_type.as_str())
            .with("source_id", self.source.id)
            .with("target_type", self.target.entity_type.as_str())
            .with("target_id", self.target.id)
            .with("relationship", self.relationship.as_str())
            .with("created_at", self.created_at);
        if let Some(id) = self.id {
            record.set("id", id);
        }
        if let Some(metadata) = self.metadata.as_ref() {
            record.set("metadata", Value::Map(metadata.clone()));
        }
        record
    }

    /// Reads a typed edge back from a stored row.
    ///
    /// Returns a human-readable reason when the row does not hold a valid edge.
    pub fn from_record(record: &Record) -> Result<Self, String> {
        let id = record.get_i64("id");
        let source = EntityRef::new(
            required_text(record, "source_type")?,
            required_int(record, "source_id")?,
        );
        let target = EntityRef::new(
            required_text(record, "target_type")?,
            required_int(record, "target_id")?,
        );
        let relationship_text = required_text(record, "relationship")?;
        let relationship = LinkKind::parse(relationship_text)
            .ok_or_else(|| format!("unknown relationship `{relationship_text}`"))?;
        let created_at = record
            .get("created_at")
            .and_then(Value::as_date)
            .copied()
            .ok_or_else(|| "missing or non-date field `created_at`".to_string())?;
        let metadata = match record.get("metadata") {
            None | Some(Value::Null) => None,
            Some(Value::Map(map)) => Some(map.clone()),
            Some(_) => return Err("field `metadata` must be a map".to_string()),
        };

        Ok(Self {
            id,
            source,
            target,
            relationship,
            created_at,
            metadata,
        })
    }
}

fn required_text<'r>(record: &'r Record, field: &str) -> Result<&'r str, String> {
    record
        .get_str(field)
        .ok_or_else(|| format!("missing or non-text field `{field}`"))
}

fn required_int(record: &Record, field: &str) -> Result<i64, String> {
    record
        .get_i64(field)
        .ok_or_else(|| format!("missing or non-integer field `{field}`"))
}

#[cfg(test)]
mod tests {
    use super::{EntityRef, Link, LinkKind};
    use crate::model::value::{Record, Value};
    use std::collections::BTreeMap;

    #[test]
    fn link_kind_text_round_trips_for_every_variant() {
        for kind in [
            LinkKind::Blocks,
            LinkKind::Supports,
            LinkKind::RelatesTo,
            LinkKind::Uses,
            LinkKind::References,
        ] {
            assert_eq!(LinkKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(LinkKind::parse("owns"), None);
    }

    #[test]
    fn record_conversion_keeps_metadata_and_id() {
        let mut metadata = BTreeMap::new();
        metadata.insert("note".to_string(), Value::from("waiting on glue"));
        let mut link = Link::new(
            EntityRef::new("project", 3),
            EntityRef::new("project", 5),
            LinkKind::Blocks,
        )
        .with_metadata(metadata);
        link.id = Some(11);

        let parsed = Link::from_record(&link.to_record()).unwrap();
        assert_eq!(parsed, link);
    }

    #[test]
    fn from_record_rejects_unknown_relationship() {
        let record = Record::new()
            .with("source_type", "project")
            .with("source_id", 1_i64)
            .with("target_type", "goal")
            .with("target_id", 2_i64)
            .with("relationship", "owns");
        let err = Link::from_record(&record).unwrap_err();
        assert!(err.contains("owns"));
    }
}
