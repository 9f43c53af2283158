//! Link repository contracts and table-backed implementation.
//!
//! # Responsibility
//! - Provide typed CRUD over the `links` relationship table.
//! - Answer outgoing/incoming edge queries for one entity.
//!
//! # Invariants
//! - Read paths reject malformed stored edges instead of masking them.
//! - Duplicate edges are allowed; nothing here deduplicates.

use crate::db::{StoreError, Table};
use crate::model::link::{EntityRef, Link, LINKS_TABLE};
use crate::model::value::{Record, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for link persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Store(StoreError),
    NotFound(i64),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "link not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted link data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Repository interface for relationship edges.
pub trait LinkRepository {
    fn create_link(&self, link: &Link) -> RepoResult<i64>;
    fn get_link(&self, id: i64) -> RepoResult<Option<Link>>;
    /// Edges whose source is `entity`, ordered by id.
    fn links_from(&self, entity: &EntityRef) -> RepoResult<Vec<Link>>;
    /// Edges whose target is `entity`, ordered by id.
    fn links_to(&self, entity: &EntityRef) -> RepoResult<Vec<Link>>;
    fn delete_link(&self, id: i64) -> RepoResult<()>;
    /// Removes every edge touching `entity`; returns how many were removed.
    fn delete_links_for(&self, entity: &EntityRef) -> RepoResult<usize>;
}

/// Link repository over a `links` table handle.
///
/// Works the same on a plain store handle and inside a transaction.
pub struct TableLinkRepository<'t> {
    table: Table<'t>,
}

impl<'t> TableLinkRepository<'t> {
    pub fn new(table: Table<'t>) -> RepoResult<Self> {
        if table.name() != LINKS_TABLE {
            return Err(RepoError::InvalidData(format!(
                "link repository requires table `{LINKS_TABLE}`, got `{}`",
                table.name()
            )));
        }
        Ok(Self { table })
    }

    fn edges_where(&self, side: &str, entity: &EntityRef) -> RepoResult<Vec<Link>> {
        let rows = self
            .table
            .where_equals(&format!("{side}_id"), &Value::Integer(entity.id))?;
        let type_field = format!("{side}_type");
        rows.iter()
            .filter(|row| row.get_str(&type_field) == Some(entity.entity_type.as_str()))
            .map(parse_link)
            .collect()
    }
}

impl LinkRepository for TableLinkRepository<'_> {
    fn create_link(&self, link: &Link) -> RepoResult<i64> {
        let mut record = link.to_record();
        record.remove("id");
        let key = self.table.add(record)?;
        key.as_int()
            .ok_or_else(|| RepoError::InvalidData(format!("non-integer link id `{key}`")))
    }

    fn get_link(&self, id: i64) -> RepoResult<Option<Link>> {
        self.table.get(id)?.as_ref().map(parse_link).transpose()
    }

    fn links_from(&self, entity: &EntityRef) -> RepoResult<Vec<Link>> {
        self.edges_where("source", entity)
    }

    fn links_to(&self, entity: &EntityRef) -> RepoResult<Vec<Link>> {
        self.edges_where("target", entity)
    }

    fn delete_link(&self, id: i64) -> RepoResult<()> {
        if !self.table.delete(id)? {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn delete_links_for(&self, entity: &EntityRef) -> RepoResult<usize> {
        let mut ids: Vec<i64> = self
            .links_from(entity)?
            .into_iter()
            .chain(self.links_to(entity)?)
            .filter_map(|link| link.id)
            .collect();
        ids.sort_unstable();
        ids.dedup();

        let mut removed = 0;
        for id in ids {
            if self.table.delete(id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn parse_link(record: &Record) -> RepoResult<Link> {
    Link::from_record(record).map_err(RepoError::InvalidData)
}
