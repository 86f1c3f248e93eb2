//! Database schema compilers.
//!
//! Generates SQL DDL and DML text from compiled relation metadata. The output
//! uses ANSI-quoted identifiers and positional `?` parameters, which both the
//! SQLite and PostgreSQL connections accept.

pub mod sql;

pub use sql::SqlCompiler;
