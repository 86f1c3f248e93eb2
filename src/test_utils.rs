//! Shared test utilities for unit and execute tests.
//!
//! Every helper builds on the genome fixture schema.

use std::sync::Arc;

use crate::database::ErDatabase;
use crate::db::DatabaseConfig;
use crate::fixtures;
use crate::schema::{Metadata, SchemaDefinition, TypeRegistry};
use crate::sync::create_missing;

/// The parsed genome fixture schema.
pub fn genome_definition() -> SchemaDefinition {
    SchemaDefinition::from_json(fixtures::GENOME_SCHEMA).expect("fixture schema parses")
}

/// The genome fixture compiled against the standard registry.
pub fn genome_metadata() -> Metadata {
    Metadata::compile(&genome_definition(), Arc::new(TypeRegistry::standard()))
        .expect("fixture schema compiles")
}

/// An in-memory SQLite database bound to `definition`, with no tables.
pub fn memory_db_with(definition: &SchemaDefinition) -> ErDatabase {
    let meta = Metadata::compile(definition, Arc::new(TypeRegistry::standard()))
        .expect("schema compiles");
    ErDatabase::open(&DatabaseConfig::Memory, Arc::new(meta)).expect("in-memory database opens")
}

/// An in-memory SQLite database bound to the genome fixture, with no tables.
pub fn memory_db() -> ErDatabase {
    memory_db_with(&genome_definition())
}

/// Like [`memory_db`], with every table created.
pub fn synced_db() -> ErDatabase {
    let db = memory_db();
    create_missing(&db).expect("tables created");
    db
}
