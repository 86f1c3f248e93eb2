//! Database connection layer.
//!
//! This module provides the connection abstraction the engine runs on:
//! - The [`SqlConnection`] trait (statements, introspection, DDL, transactions)
//! - SQLite (file or in-memory) and PostgreSQL implementations
//! - Backend selection from URLs, environment and config files
//! - Bounded retry of transient failures
//!
//! # Type Decisions
//!
//! **Why one `Value` enum for parameters and cells?**
//! The type registry encodes application values into storable values and decodes
//! them back; sharing one enum keeps both directions free of per-backend types.
//!
//! **Why positional `?` placeholders everywhere?**
//! The query compiler emits them, SQLite binds them natively and the PostgreSQL
//! backend inlines escaped literals in their place.

mod backend;
mod config;
pub mod escape;
mod postgres;
mod retry;
mod sqlite;
mod value;

pub use backend::{
    normalize_sql_type, ColumnInfo, IndexColumn, IndexInfo, QueryResult, SqlConnection,
};
pub use config::{DatabaseConfig, PostgresConfig};
pub use postgres::PostgresConnection;
pub use retry::{with_retry, DEFAULT_MAX_RETRIES};
pub use sqlite::SqliteConnection;
pub use value::Value;

use thiserror::Error;

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to open database '{path}': {message}")]
    OpenFailed { path: String, message: String },

    #[error("Query failed: {message}")]
    QueryFailed { message: String },

    #[error("Transient database failure: {message}")]
    Transient { message: String },

    #[error("Missing column '{name}' in query result")]
    MissingColumn { name: String },

    #[error("Unsupported database URL '{url}': {reason}")]
    UnsupportedUrl { url: String, reason: String },
}

impl DbError {
    /// Whether the failure belongs to the retryable "server error" class.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Transient { .. })
    }
}
