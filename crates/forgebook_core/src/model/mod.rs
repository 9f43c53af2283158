//! Document and relationship model shared by every table.
//!
//! # Responsibility
//! - Define the schemaless record shape used by the generic table interface.
//! - Define the typed relationship edge stored in the `links` table.
//!
//! # Invariants
//! - Every row is a `Record`; typed models convert to and from records.

pub mod link;
pub mod value;
