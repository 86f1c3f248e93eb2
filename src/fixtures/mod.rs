//! Schema definitions shared by unit tests.

/// Genomes with features, annotations, drugs and subsystems. Covers
/// secondary fields, an embedded relationship, a many-to-many relationship
/// and a loose relationship.
pub const GENOME_SCHEMA: &str = include_str!("genome.json");
