//! Declarative entity/relationship schemas and their compiled metadata.
//!
//! # Overview
//!
//! 1. **Definition** (`definition.rs`): the JSON schema document as written by
//!    users: entities, relationships, fields and indexes.
//! 2. **Types** (`types.rs`): the field type registry.
//! 3. **Metadata** (`metadata.rs`): the immutable store compiled from a
//!    definition: objects, relations, converse names, crossing and jump tables.
//! 4. **Crossing** (`crossing.rs`): adjacency between objects used to build joins.
//! 5. **Compilers** (`compilers/`): DDL generated from compiled relations.
//!
//! # Naming
//!
//! | Schema name | SQL name |
//! |-------------|----------|
//! | `GenomeHasFeature` (object, relation) | `genome_has_feature` |
//! | `dna-size` (field) | `dna_size` |
//! | `idxName` on `Genome` (index) | `genome_idx_name` |

pub mod compilers;
mod crossing;
mod definition;
mod metadata;
pub mod types;

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

pub use crossing::{CrossingEntry, CrossingTable, JumpTable};
pub use definition::{
    Arity, EntityDef, FieldDef, IndexDef, IndexExtension, RelationshipDef, SchemaDefinition,
};
pub use metadata::{
    Direction, EntityMeta, FieldMeta, IndexField, IndexMeta, Metadata, ObjectKind, ObjectMeta,
    RelationMeta, RelationshipMeta, FIELD_FROM_LINK, FIELD_ID, FIELD_TO_LINK, RESERVED_FIELDS,
};
pub use types::{FieldType, SortKey, TypeError, TypeKind, TypeRegistry};

/// Errors raised while loading or compiling a schema. These are never recovered.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Failed to read schema '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse schema: {message}")]
    Parse { message: String },

    #[error("Invalid object name '{name}'")]
    InvalidObjectName { name: String },

    #[error("Invalid field name '{field}' in {object}")]
    InvalidFieldName { object: String, field: String },

    #[error("Field name '{field}' in {object} is reserved")]
    ReservedFieldName { object: String, field: String },

    #[error("Duplicate name '{name}'")]
    DuplicateName { name: String },

    #[error("Duplicate field '{field}' in {object}")]
    DuplicateField { object: String, field: String },

    #[error("Relationship {relationship} refers to unknown entity '{entity}'")]
    UnknownEntity { relationship: String, entity: String },

    #[error("Index {index} of {object} refers to unknown field '{field}'")]
    UnknownIndexField {
        object: String,
        index: String,
        field: String,
    },

    #[error("Index {index} of {object} spans more than one relation")]
    IndexSpansRelations { object: String, index: String },

    #[error("Index {index} of {object} includes non-indexable field '{field}'")]
    NotIndexable {
        object: String,
        index: String,
        field: String,
    },

    #[error("Relationship {relationship} fields must live in its own relation")]
    RelationshipFieldRelation { relationship: String },

    #[error("Embedded relationship {relationship} must be one-to-many")]
    EmbeddedManyToMany { relationship: String },

    #[error("Autocounter entity {entity} needs an integer key type, not '{key_type}'")]
    AutocounterKey { entity: String, key_type: String },

    #[error(transparent)]
    Type(#[from] TypeError),
}

static OBJECT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]([A-Za-z0-9]*[A-Za-z])?$").expect("valid regex"));

static FIELD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$").expect("valid regex"));

/// Object and relation names are capitalized words that do not end in a digit,
/// so trailing digits in a query token are always an instance number.
pub fn is_valid_object_name(name: &str) -> bool {
    OBJECT_NAME.is_match(name)
}

/// Field names are lower-case words joined by hyphens.
pub fn is_valid_field_name(name: &str) -> bool {
    FIELD_NAME.is_match(name)
}

/// `GenomeHasFeature` → `genome_has_feature`, `idxName` → `idx_name`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '-' {
            out.push('_');
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}

/// `FeatureHasAnnotation` → `feature-has-annotation`.
pub fn kebab_case(name: &str) -> String {
    snake_case(name).replace('_', "-")
}

/// SQL column name of a field.
pub fn column_name(field: &str) -> String {
    field.replace('-', "_")
}
