//! Crate-level error type.

use thiserror::Error;

use crate::db::DbError;
use crate::query::QueryError;
use crate::schema::{SchemaError, TypeError};

/// Caller misuse detected while writing objects.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntegrityError {
    #[error("Required field '{field}' of {object} was not supplied")]
    MissingField { object: String, field: String },

    #[error("{object} has no field '{field}'")]
    UnknownField { object: String, field: String },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error("{entity} is not an autocounter entity")]
    NotAutocounter { entity: String },

    #[error("Cannot reserve {count} ids for {entity}")]
    InvalidIdCount { entity: String, count: u64 },

    #[error("Field {object}({field}) was given {found} values but needs {expected}")]
    MismatchedValues {
        object: String,
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("Field {object}({field}) cannot be updated in place")]
    NotUpdatable { object: String, field: String },

    #[error("Line {line} of the {relation} load file has {found} fields, expected {expected}")]
    MalformedRow {
        relation: String,
        line: usize,
        expected: usize,
        found: usize,
    },
}

/// Any failure raised by the engine.
#[derive(Error, Debug)]
pub enum ErdbError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("Failed to read '{path}': {message}")]
    Io { path: String, message: String },
}
