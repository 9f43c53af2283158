//! Generic per-table operations over document rows.
//!
//! # Responsibility
//! - Provide the collaborator-facing CRUD surface (`get`, `add`, `put`,
//!   `update`, `delete`, `bulk_add`, ...) for any catalog table.
//! - Keep SQL and document encoding inside the storage boundary.
//!
//! # Invariants
//! - A table handle never outlives the connection or transaction it borrows.
//! - Key type must match the table's primary key kind.
//! - `bulk_add` is all-or-nothing, inside or outside a transaction.

use super::catalog::TableDescriptor;
use super::document::{decode_document, encode_document};
use super::migrations::index_spec::is_valid_identifier;
use crate::model::value::{Record, RowKey, Value};
use log::debug;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from generic table operations.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    UnknownTable(String),
    /// Natural-key table received a row without its key field.
    MissingKey {
        table: String,
        field: String,
    },
    /// Key value or key type does not fit the table's primary key.
    InvalidKey {
        table: String,
        field: String,
    },
    /// Unique index or primary key collision.
    Constraint {
        table: String,
        message: String,
    },
    InvalidDocument {
        table: String,
        message: String,
    },
    UnsupportedQuery {
        table: String,
        field: String,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnknownTable(table) => write!(f, "unknown table `{table}`"),
            Self::MissingKey { table, field } => {
                write!(f, "row for `{table}` is missing key field `{field}`")
            }
            Self::InvalidKey { table, field } => {
                write!(f, "invalid key for `{table}.{field}`")
            }
            Self::Constraint { table, message } => {
                write!(f, "constraint violation on `{table}`: {message}")
            }
            Self::InvalidDocument { table, message } => {
                write!(f, "invalid stored document in `{table}`: {message}")
            }
            Self::UnsupportedQuery { table, field } => {
                write!(f, "unsupported equality query on `{table}.{field}`")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Handle to one table on a connection or inside a transaction.
#[derive(Debug, Clone, Copy)]
pub struct Table<'conn> {
    conn: &'conn Connection,
    descriptor: &'conn TableDescriptor,
}

impl<'conn> Table<'conn> {
    pub(crate) fn new(conn: &'conn Connection, descriptor: &'conn TableDescriptor) -> Self {
        Self { conn, descriptor }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &TableDescriptor {
        self.descriptor
    }

    pub fn get(&self, key: impl Into<RowKey>) -> StoreResult<Option<Record>> {
        let key = key.into();
        self.check_key(&key)?;
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT pk, doc FROM \"{}\" WHERE pk = ?1;", self.name()))?;
        let row = stmt
            .query_row([&key], |row| Ok((read_key(row)?, row.get::<_, String>(1)?)))
            .optional()?;
        row.map(|(key, doc)| self.decode_row(key, &doc)).transpose()
    }

    /// Inserts one row and returns its key.
    ///
    /// Auto-key tables assign the next integer when the key field is absent
    /// or null; an explicit integer key is kept as-is.
    pub fn add(&self, record: Record) -> StoreResult<RowKey> {
        let doc = encode_document(&record, self.descriptor.primary_key_field());
        match self.key_of(&record)? {
            Some(key) => {
                let mut stmt = self.conn.prepare_cached(&format!(
                    "INSERT INTO \"{}\" (pk, doc) VALUES (?1, ?2);",
                    self.name()
                ))?;
                stmt.execute(params![key, doc])
                    .map_err(|err| self.map_write_error(err))?;
                Ok(key)
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare_cached(&format!("INSERT INTO \"{}\" (doc) VALUES (?1);", self.name()))?;
                stmt.execute([doc])
                    .map_err(|err| self.map_write_error(err))?;
                Ok(RowKey::Int(self.conn.last_insert_rowid()))
            }
        }
    }

    /// Inserts or replaces one row by key.
    pub fn put(&self, record: Record) -> StoreResult<RowKey> {
        let Some(key) = self.key_of(&record)? else {
            return self.add(record);
        };
        let doc = encode_document(&record, self.descriptor.primary_key_field());
        self.conn
            .prepare_cached(&format!(
                "INSERT INTO \"{}\" (pk, doc) VALUES (?1, ?2)
                 ON CONFLICT(pk) DO UPDATE SET doc = excluded.doc;",
                self.name()
            ))?
            .execute(params![key, doc])
            .map_err(|err| self.map_write_error(err))?;
        Ok(key)
    }

    /// Shallow-merges `changes` into the stored row.
    ///
    /// Returns `false` when no row has `key`. The key field itself cannot be
    /// changed.
    pub fn update(&self, key: impl Into<RowKey>, changes: Record) -> StoreResult<bool> {
        let key = key.into();
        let pk_field = self.descriptor.primary_key_field();
        if let Some(requested) = changes.get(pk_field) {
            if RowKey::from_value(requested).as_ref() != Some(&key) {
                return Err(self.invalid_key());
            }
        }
        let Some(mut current) = self.get(key.clone())? else {
            return Ok(false);
        };
        for (field, value) in changes {
            current.set(field, value);
        }
        let doc = encode_document(&current, pk_field);
        let changed = self
            .conn
            .prepare_cached(&format!("UPDATE \"{}\" SET doc = ?2 WHERE pk = ?1;", self.name()))?
            .execute(params![key, doc])
            .map_err(|err| self.map_write_error(err))?;
        Ok(changed > 0)
    }

    /// Returns whether a row was removed.
    pub fn delete(&self, key: impl Into<RowKey>) -> StoreResult<bool> {
        let key = key.into();
        self.check_key(&key)?;
        let changed = self
            .conn
            .prepare_cached(&format!("DELETE FROM \"{}\" WHERE pk = ?1;", self.name()))?
            .execute([&key])?;
        Ok(changed > 0)
    }

    /// Inserts every row or none of them.
    pub fn bulk_add(&self, records: Vec<Record>) -> StoreResult<Vec<RowKey>> {
        self.conn.execute_batch("SAVEPOINT bulk_add;")?;
        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            match self.add(record) {
                Ok(key) => keys.push(key),
                Err(err) => {
                    if let Err(rollback_err) = self
                        .conn
                        .execute_batch("ROLLBACK TO bulk_add; RELEASE bulk_add;")
                    {
                        debug!(
                            "event=bulk_add_rollback module=store status=error table={} error={}",
                            self.name(),
                            rollback_err
                        );
                    }
                    return Err(err);
                }
            }
        }
        self.conn.execute_batch("RELEASE bulk_add;")?;
        Ok(keys)
    }

    /// All rows ordered by primary key.
    pub fn all(&self) -> StoreResult<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT pk, doc FROM \"{}\" ORDER BY pk ASC;", self.name()))?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let key = read_key(row)?;
            let doc: String = row.get(1)?;
            records.push(self.decode_row(key, &doc)?);
        }
        Ok(records)
    }

    /// Rows whose `field` equals a scalar `value`, ordered by primary key.
    pub fn where_equals(&self, field: &str, value: &Value) -> StoreResult<Vec<Record>> {
        if field == self.descriptor.primary_key_field() {
            let key = RowKey::from_value(value).ok_or_else(|| self.unsupported_query(field))?;
            return Ok(self.get(key)?.into_iter().collect());
        }
        if !is_valid_identifier(field) {
            return Err(self.unsupported_query(field));
        }
        let bound = match value {
            Value::Integer(number) => SqlValue::Integer(*number),
            Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
            Value::Real(number) => SqlValue::Real(*number),
            Value::Text(text) => SqlValue::Text(text.clone()),
            _ => return Err(self.unsupported_query(field)),
        };

        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT pk, doc FROM \"{}\"
             WHERE json_extract(doc, '$.{field}') = ?1
             ORDER BY pk ASC;",
            self.name()
        ))?;
        let mut rows = stmt.query([bound])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let key = read_key(row)?;
            let doc: String = row.get(1)?;
            records.push(self.decode_row(key, &doc)?);
        }
        Ok(records)
    }

    pub fn count(&self) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\";", self.name()),
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Removes every row and returns how many were removed.
    pub fn clear(&self) -> StoreResult<usize> {
        let removed = self
            .conn
            .execute(&format!("DELETE FROM \"{}\";", self.name()), [])?;
        Ok(removed)
    }

    fn key_of(&self, record: &Record) -> StoreResult<Option<RowKey>> {
        let field = self.descriptor.primary_key_field();
        match (record.get(field), self.descriptor.has_auto_key()) {
            (None | Some(Value::Null), true) => Ok(None),
            (None | Some(Value::Null), false) => Err(StoreError::MissingKey {
                table: self.name().to_string(),
                field: field.to_string(),
            }),
            (Some(Value::Integer(id)), true) => Ok(Some(RowKey::Int(*id))),
            (Some(Value::Text(text)), false) if !text.is_empty() => {
                Ok(Some(RowKey::Text(text.clone())))
            }
            _ => Err(self.invalid_key()),
        }
    }

    fn check_key(&self, key: &RowKey) -> StoreResult<()> {
        match (key, self.descriptor.has_auto_key()) {
            (RowKey::Int(_), true) | (RowKey::Text(_), false) => Ok(()),
            _ => Err(self.invalid_key()),
        }
    }

    fn decode_row(&self, key: RowKey, doc: &str) -> StoreResult<Record> {
        let mut record = decode_document(doc).map_err(|message| StoreError::InvalidDocument {
            table: self.name().to_string(),
            message,
        })?;
        record.set(self.descriptor.primary_key_field(), key.into_value());
        Ok(record)
    }

    fn map_write_error(&self, err: rusqlite::Error) -> StoreError {
        match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => StoreError::Constraint {
                table: self.name().to_string(),
                message: err.to_string(),
            },
            _ => StoreError::Sqlite(err),
        }
    }

    fn invalid_key(&self) -> StoreError {
        StoreError::InvalidKey {
            table: self.name().to_string(),
            field: self.descriptor.primary_key_field().to_string(),
        }
    }

    fn unsupported_query(&self, field: &str) -> StoreError {
        StoreError::UnsupportedQuery {
            table: self.name().to_string(),
            field: field.to_string(),
        }
    }
}

fn read_key(row: &Row<'_>) -> rusqlite::Result<RowKey> {
    match row.get::<_, SqlValue>(0)? {
        SqlValue::Integer(id) => Ok(RowKey::Int(id)),
        SqlValue::Text(text) => Ok(RowKey::Text(text)),
        other => Err(rusqlite::Error::InvalidColumnType(
            0,
            "pk".to_string(),
            other.data_type(),
        )),
    }
}
