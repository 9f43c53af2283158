//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate storage, snapshot, and settings calls into use-case level
//!   APIs (export, import, reset).
//! - Keep CLI and UI hosts decoupled from storage details.

pub mod archive;
pub mod backup_service;
