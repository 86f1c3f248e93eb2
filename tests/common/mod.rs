//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use erdb::db::DatabaseConfig;
use erdb::schema::{Metadata, SchemaDefinition, TypeRegistry};
use erdb::{ErDatabase, Record};

pub const GENOME_SCHEMA: &str = include_str!("../../src/fixtures/genome.json");

pub fn genome_metadata() -> Arc<Metadata> {
    let definition = SchemaDefinition::from_json(GENOME_SCHEMA).expect("fixture schema parses");
    let meta = Metadata::compile(&definition, Arc::new(TypeRegistry::standard()))
        .expect("fixture schema compiles");
    Arc::new(meta)
}

pub fn open_sqlite(path: &Path, meta: Arc<Metadata>) -> ErDatabase {
    ErDatabase::open(
        &DatabaseConfig::Sqlite {
            path: path.to_path_buf(),
        },
        meta,
    )
    .expect("sqlite database opens")
}

/// One genome with `features` features, each carrying one annotation.
pub fn seed_genome(db: &ErDatabase, genome: &str, features: usize) {
    db.insert_object(
        "Genome",
        &Record::new()
            .with("id", genome)
            .with("genus", "Escherichia")
            .with("species", "coli")
            .with("alias", format!("{genome}-alias")),
    )
    .expect("genome inserted");
    for n in 0..features {
        let feature = format!("fig|{genome}.peg.{n}");
        db.insert_object(
            "Feature",
            &Record::new().with("id", feature.as_str()).with("feature-type", "peg"),
        )
        .expect("feature inserted");
        db.insert_object(
            "GenomeHasFeature",
            &Record::new().with("from-link", genome).with("to-link", feature.as_str()),
        )
        .expect("link inserted");
        let annotation = db
            .insert_object("Annotation", &Record::new().with("annotator", "rast"))
            .expect("annotation inserted");
        db.insert_object(
            "FeatureHasAnnotation",
            &Record::new()
                .with("from-link", feature.as_str())
                .with("to-link", annotation)
                .with("annotation-time", 1_700_000_000i64),
        )
        .expect("annotation linked");
    }
}
