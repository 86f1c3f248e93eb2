//! erdb library - schema-driven entity-relationship database engine
//!
//! Compiles an entity-relationship schema into relational tables, compiles
//! object-name-list queries into SQL, keeps live tables in line with the
//! schema and deletes entity instances with everything that depends on them.

pub mod cli;
pub mod commands;
pub mod config;
pub mod database;
pub mod db;
pub mod delete;
pub mod error;
pub mod keys;
pub mod output;
pub mod query;
pub mod record;
pub mod schema;
pub mod sync;

#[cfg(test)]
pub mod fixtures;

#[cfg(test)]
pub mod test_utils;

pub use database::ErDatabase;
pub use db::Value;
pub use error::{ErdbError, IntegrityError};
pub use record::Record;
