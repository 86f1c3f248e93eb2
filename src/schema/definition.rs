//! Core schema definition types.
//!
//! A schema document is JSON:
//!
//! ```json
//! {
//!   "entities": [
//!     { "name": "Genome", "key_type": "string",
//!       "fields": [{ "name": "genus", "type": "string" }],
//!       "indexes": [{ "name": "idxName", "fields": ["genus", "species DESC"] }] }
//!   ],
//!   "relationships": [
//!     { "name": "GenomeHasFeature", "converse": "FeatureInGenome",
//!       "from": "Genome", "to": "Feature", "arity": "1M" }
//!   ]
//! }
//! ```
//!
//! These types are the raw document; [`super::Metadata::compile`] validates them
//! and derives everything the engine works with.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::SchemaError;
use crate::db::Value;

/// A complete schema document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub entities: Vec<EntityDef>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
}

impl SchemaDefinition {
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(json).map_err(|e| SchemaError::Parse {
            message: e.to_string(),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path).map_err(|e| SchemaError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&content)
    }
}

fn default_key_type() -> String {
    "string".to_string()
}

/// An entity: an object with its own identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,

    /// Type of the implicit `id` field.
    #[serde(default = "default_key_type")]
    pub key_type: String,

    /// Keys are allocated by the engine instead of supplied by callers.
    #[serde(default)]
    pub autocounter: bool,

    #[serde(default)]
    pub fields: Vec<FieldDef>,

    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

/// A field of an entity or relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: String,

    /// Relation holding the field. Defaults to the declaring object; any other
    /// name makes it a secondary (multi-valued) field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default)]
    pub nullable: bool,
}

impl FieldDef {
    pub fn new(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
            relation: None,
            default: None,
            nullable: false,
        }
    }
}

/// A declared index. Field entries are `name` or `name DESC`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,

    #[serde(default)]
    pub unique: bool,

    pub fields: Vec<String>,
}

/// Extra fields and uniqueness for a relationship's implicit from/to index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexExtension {
    #[serde(default)]
    pub unique: bool,

    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arity {
    #[serde(rename = "1M")]
    OneToMany,
    #[serde(rename = "MM")]
    ManyToMany,
}

/// A relationship between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub name: String,

    /// Name used to traverse the relationship from its target back to its source.
    pub converse: String,

    pub from: String,

    pub to: String,

    pub arity: Arity,

    /// Stored in the target entity's primary relation instead of its own table.
    #[serde(default)]
    pub embedded: bool,

    /// Deleting the source does not cascade to the target.
    #[serde(default)]
    pub loose: bool,

    /// Intersection fields.
    #[serde(default)]
    pub fields: Vec<FieldDef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_index: Option<IndexExtension>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_index: Option<IndexExtension>,

    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}
