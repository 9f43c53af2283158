//! Typed repositories layered over generic tables.
//!
//! # Responsibility
//! - Define use-case oriented access contracts for tables whose rows have a
//!   fixed shape.
//! - Keep record conversion out of service orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`) in addition to
//!   storage errors.

pub mod link_repo;
