//! Query compilation.
//!
//! A query is an object-name-list plus a filter clause:
//!
//! ```text
//! objects: "Genome GenomeHasFeature Feature"
//! filter:  "Genome(genus) = ? AND Feature(feature-type) = 'peg' ORDER BY Feature(id) LIMIT 10"
//! ```
//!
//! # Overview
//!
//! | Step | Module | Output |
//! |------|--------|--------|
//! | Tokenize the object list, expand jumps | `object_list.rs` | [`ObjectList`] |
//! | Parse the filter once | `filter.rs` | [`ParsedFilter`] |
//! | Resolve aliases, joins and columns | `compiler.rs` | [`CompiledQuery`] |
//!
//! Compilation never touches the database; every error is reported before any
//! SQL runs.

mod compiler;
mod filter;
mod object_list;

pub use compiler::{ColumnMap, CompiledQuery, QueryCompiler};
pub use filter::{parse_field_ref, parse_filter, FilterPart, NameResolver, ParsedFilter};
pub use object_list::{ObjectList, ObjectToken, Token, RESERVED_INSTANCE};

use thiserror::Error;

/// Errors raised while compiling a query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Unknown object '{name}'")]
    UnknownObject { name: String },

    #[error("Object '{name}' is not in the object-name-list")]
    ObjectNotInList { name: String },

    #[error("Unknown field '{field}' of {object}")]
    UnknownField { object: String, field: String },

    #[error("No path from {from} to {to}")]
    NoPath { from: String, to: String },

    #[error("Instance number of '{token}' is reserved (must be below 100)")]
    ReservedInstance { token: String },

    #[error("Malformed object name '{token}'")]
    MalformedToken { token: String },

    #[error("Object-name-list names no objects")]
    EmptyObjectList,

    #[error("Secondary field {object}({field}) cannot be used in ORDER BY")]
    SecondaryInOrderBy { object: String, field: String },

    #[error("Invalid LIMIT value '{value}'")]
    InvalidLimit { value: String },

    #[error("Invalid field reference '{spec}'")]
    InvalidFieldRef { spec: String },

    #[error("Filter has {expected} parameters, {found} given")]
    ParameterCount { expected: usize, found: usize },
}
