//! Referential-integrity sweep.

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::database::ErDatabase;
use crate::db::escape::{placeholders, quote_identifier};
use crate::db::{DbError, SqlConnection, Value};
use crate::delete::{delete_entity, DeleteMode};
use crate::error::ErdbError;
use crate::schema::{FieldType, RelationshipMeta, FIELD_FROM_LINK, FIELD_ID, FIELD_TO_LINK};

/// Keys checked for existence per statement.
pub const SWEEP_BATCH: usize = 100;

/// Findings for one relationship endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepEntry {
    pub relationship: String,
    /// `from-link` or `to-link`.
    pub link: String,
    /// Distinct keys examined.
    pub checked: usize,
    /// Keys whose entity instance is gone.
    pub missing: usize,
    /// Relationship rows, or dependent entity instances for embedded
    /// relationships, removed (or that would be removed in a dry run).
    pub removed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub dry_run: bool,
    pub entries: Vec<SweepEntry>,
}

impl SweepReport {
    pub fn total_removed(&self) -> u64 {
        self.entries.iter().map(|e| e.removed).sum()
    }
}

/// Distinct non-null values of `column`, in order.
fn distinct_keys(conn: &dyn SqlConnection, table: &str, column: &str) -> Result<Vec<Value>, DbError> {
    let column = quote_identifier(column);
    let sql = format!(
        "SELECT DISTINCT {column} FROM {} WHERE {column} IS NOT NULL ORDER BY {column}",
        quote_identifier(table)
    );
    Ok(conn.query(&sql, &[])?.first_column())
}

/// The members of `keys` with no row in `table`.
fn missing_keys(conn: &dyn SqlConnection, table: &str, keys: &[Value]) -> Result<Vec<Value>, DbError> {
    let sql = format!(
        "SELECT {id} FROM {} WHERE {id} IN ({})",
        quote_identifier(table),
        placeholders(keys.len()),
        id = quote_identifier(FIELD_ID),
    );
    let found: Vec<String> = conn
        .query(&sql, keys)?
        .first_column()
        .iter()
        .map(Value::to_string)
        .collect();
    Ok(keys
        .iter()
        .filter(|k| !found.contains(&k.to_string()))
        .cloned()
        .collect())
}

fn entity_table<'m>(db: &'m ErDatabase, entity: &str) -> Option<&'m str> {
    let meta = db.metadata();
    meta.entity(entity)
        .and_then(|e| meta.relation(e.primary_relation()))
        .map(|r| r.sql_name.as_str())
}

/// Remove rows of a real relationship whose `link` endpoint no longer exists.
fn sweep_link(
    db: &ErDatabase,
    rel: &RelationshipMeta,
    link: &str,
    entity: &str,
    dry_run: bool,
) -> Result<SweepEntry, ErdbError> {
    let conn = db.connection();
    let meta = db.metadata();
    let mut entry = SweepEntry {
        relationship: rel.name.clone(),
        link: link.to_string(),
        ..SweepEntry::default()
    };
    let (Some(table), Some(column), Some(target)) = (
        meta.relation(&rel.relation).map(|r| r.sql_name.as_str()),
        rel.field(link).map(|f| f.column.as_str()),
        entity_table(db, entity),
    ) else {
        return Ok(entry);
    };

    let keys = distinct_keys(conn, table, column)?;
    entry.checked = keys.len();
    for batch in keys.chunks(SWEEP_BATCH) {
        let missing = missing_keys(conn, target, batch)?;
        if missing.is_empty() {
            continue;
        }
        entry.missing += missing.len();
        let condition = format!("{} IN ({})", quote_identifier(column), placeholders(missing.len()));
        entry.removed += if dry_run {
            let sql = format!("SELECT COUNT(*) FROM {} WHERE {condition}", quote_identifier(table));
            conn.query(&sql, &missing)?.scalar().and_then(Value::as_i64).unwrap_or(0) as u64
        } else {
            let sql = format!("DELETE FROM {} WHERE {condition}", quote_identifier(table));
            conn.execute(&sql, &missing)?
        };
    }
    Ok(entry)
}

/// Remove dependents of an embedded relationship whose source instance is gone.
///
/// Dependents of a non-loose relationship are deleted with everything that
/// hangs off them. Dependents of a loose one only lose their link.
fn sweep_embedded(db: &ErDatabase, rel: &RelationshipMeta, dry_run: bool) -> Result<SweepEntry, ErdbError> {
    let conn = db.connection();
    let meta = db.metadata();
    let mut entry = SweepEntry {
        relationship: rel.name.clone(),
        link: FIELD_FROM_LINK.to_string(),
        ..SweepEntry::default()
    };
    let (Some(table), Some(link), Some(source)) = (
        entity_table(db, &rel.to),
        rel.field(FIELD_FROM_LINK),
        entity_table(db, &rel.from),
    ) else {
        return Ok(entry);
    };
    let column = quote_identifier(&link.column);
    let id_type = meta
        .field(&rel.to, FIELD_ID)
        .map(|f| meta.field_type(f))
        .transpose()?;

    let keys = distinct_keys(conn, table, &link.column)?;
    entry.checked = keys.len();
    for batch in keys.chunks(SWEEP_BATCH) {
        let missing = missing_keys(conn, source, batch)?;
        if missing.is_empty() {
            continue;
        }
        entry.missing += missing.len();
        let condition = format!("{column} IN ({})", placeholders(missing.len()));

        if rel.loose {
            entry.removed += if dry_run {
                let sql = format!("SELECT COUNT(*) FROM {} WHERE {condition}", quote_identifier(table));
                conn.query(&sql, &missing)?.scalar().and_then(Value::as_i64).unwrap_or(0) as u64
            } else {
                let sql = format!(
                    "UPDATE {} SET {} WHERE {condition}",
                    quote_identifier(table),
                    rel.unlink_assignments()
                );
                conn.execute(&sql, &missing)?
            };
            continue;
        }

        let sql = format!(
            "SELECT {} FROM {} WHERE {condition}",
            quote_identifier(FIELD_ID),
            quote_identifier(table)
        );
        let dependents = conn.query(&sql, &missing)?.first_column();
        entry.removed += dependents.len() as u64;
        if dry_run {
            continue;
        }
        for stored in dependents {
            let id = match id_type {
                Some(ty) => ty.decode(&stored)?,
                None => stored,
            };
            debug!(entity = %rel.to, %id, "Deleting orphaned dependent");
            delete_entity(db, &rel.to, &id, DeleteMode::Full)?;
        }
    }
    Ok(entry)
}

/// Check every relationship's endpoints and remove what points at nothing.
///
/// Keys are checked in batches of [`SWEEP_BATCH`]. With `dry_run` set nothing
/// is changed and the report only counts. Statements are not retried.
#[instrument(skip(db))]
pub fn check_integrity(db: &ErDatabase, dry_run: bool) -> Result<SweepReport, ErdbError> {
    let mut report = SweepReport {
        dry_run,
        entries: Vec::new(),
    };
    let relationships: Vec<RelationshipMeta> = db.metadata().relationships.values().cloned().collect();
    for rel in &relationships {
        if rel.embedded {
            report.entries.push(sweep_embedded(db, rel, dry_run)?);
        } else {
            report.entries.push(sweep_link(db, rel, FIELD_FROM_LINK, &rel.from, dry_run)?);
            report.entries.push(sweep_link(db, rel, FIELD_TO_LINK, &rel.to, dry_run)?);
        }
    }
    for entry in report.entries.iter().filter(|e| e.missing > 0) {
        warn!(
            relationship = %entry.relationship,
            link = %entry.link,
            missing = entry.missing,
            removed = entry.removed,
            dry_run,
            "Orphaned rows found"
        );
    }
    info!(removed = report.total_removed(), dry_run, "Integrity sweep finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::sync::create_missing;
    use crate::test_utils::{genome_definition, memory_db, memory_db_with};
    use rstest::{fixture, rstest};

    #[fixture]
    fn db() -> ErDatabase {
        let db = memory_db();
        create_missing(&db).unwrap();
        db
    }

    fn genome(db: &ErDatabase, id: &str) {
        db.insert_object(
            "Genome",
            &Record::new().with("id", id).with("genus", "Escherichia").with("species", "coli"),
        )
        .unwrap();
    }

    fn feature(db: &ErDatabase, id: &str) {
        db.insert_object("Feature", &Record::new().with("id", id)).unwrap();
    }

    fn link(db: &ErDatabase, relationship: &str, from: impl Into<Value>, to: impl Into<Value>) {
        db.insert_object(
            relationship,
            &Record::new().with("from-link", from).with("to-link", to),
        )
        .unwrap();
    }

    fn entry<'r>(report: &'r SweepReport, relationship: &str, link: &str) -> &'r SweepEntry {
        report
            .entries
            .iter()
            .find(|e| e.relationship == relationship && e.link == link)
            .unwrap()
    }

    #[rstest]
    fn test_clean_database_reports_nothing(db: ErDatabase) {
        genome(&db, "g1");
        feature(&db, "f1");
        link(&db, "GenomeHasFeature", "g1", "f1");
        let report = check_integrity(&db, false).unwrap();
        assert_eq!(report.total_removed(), 0);
        assert_eq!(entry(&report, "GenomeHasFeature", "from-link").checked, 1);
    }

    #[rstest]
    fn test_orphaned_relationship_rows_removed(db: ErDatabase) {
        genome(&db, "g1");
        feature(&db, "f1");
        feature(&db, "f2");
        link(&db, "GenomeHasFeature", "g1", "f1");
        link(&db, "GenomeHasFeature", "g2", "f2");
        link(&db, "GenomeHasFeature", "g1", "f3");

        let dry = check_integrity(&db, true).unwrap();
        assert_eq!(entry(&dry, "GenomeHasFeature", "from-link").removed, 1);
        assert_eq!(entry(&dry, "GenomeHasFeature", "to-link").removed, 1);
        assert_eq!(db.get_count("GenomeHasFeature", "", &[]).unwrap(), 3);

        let report = check_integrity(&db, false).unwrap();
        assert_eq!(report.total_removed(), 2);
        assert_eq!(db.get_count("GenomeHasFeature", "", &[]).unwrap(), 1);
        assert_eq!(check_integrity(&db, false).unwrap().total_removed(), 0);
    }

    #[rstest]
    fn test_embedded_dependents_deleted(db: ErDatabase) {
        feature(&db, "f1");
        let kept = db.insert_object("Annotation", &Record::new()).unwrap();
        let orphan = db.insert_object("Annotation", &Record::new()).unwrap();
        db.insert_object(
            "FeatureHasAnnotation",
            &Record::new()
                .with("from-link", "f1")
                .with("to-link", kept.clone())
                .with("annotation-time", 1_700_000_000i64),
        )
        .unwrap();
        db.insert_object(
            "FeatureHasAnnotation",
            &Record::new()
                .with("from-link", "gone")
                .with("to-link", orphan.clone())
                .with("annotation-time", 1_700_000_000i64),
        )
        .unwrap();

        let report = check_integrity(&db, false).unwrap();
        let sweep = entry(&report, "FeatureHasAnnotation", "from-link");
        assert_eq!((sweep.checked, sweep.missing, sweep.removed), (2, 1, 1));
        assert!(db.exists("Annotation", &kept).unwrap());
        assert!(!db.exists("Annotation", &orphan).unwrap());
    }

    #[rstest]
    fn test_loose_sweep_matches_delete(#[values(false, true)] swept_first: bool) {
        let mut definition = genome_definition();
        for rel in &mut definition.relationships {
            if rel.name == "FeatureHasAnnotation" {
                rel.loose = true;
            }
        }
        let db = memory_db_with(&definition);
        create_missing(&db).unwrap();
        let mut annotations = Vec::new();
        for f in ["f1", "f2"] {
            feature(&db, f);
            let annotation = db.insert_object("Annotation", &Record::new()).unwrap();
            db.insert_object(
                "FeatureHasAnnotation",
                &Record::new()
                    .with("from-link", f)
                    .with("to-link", annotation.clone())
                    .with("annotation-time", 1_700_000_000i64),
            )
            .unwrap();
            annotations.push(annotation);
        }

        let (swept, deleted) = if swept_first { ("f1", "f2") } else { ("f2", "f1") };
        db.execute(r#"DELETE FROM "feature" WHERE "id" = ?"#, &[Value::from(swept)])
            .unwrap();
        let report = check_integrity(&db, false).unwrap();
        assert_eq!(entry(&report, "FeatureHasAnnotation", "from-link").removed, 1);
        delete_entity(&db, "Feature", &Value::from(deleted), DeleteMode::Full).unwrap();

        assert_eq!(db.get_count("Annotation", "", &[]).unwrap(), 2);
        let unlinked = "Annotation(feature-has-annotation-from-link) IS NULL \
            AND Annotation(feature-has-annotation-annotation-time) IS NULL";
        assert_eq!(db.get_count("Annotation", unlinked, &[]).unwrap(), 2);
    }

    #[rstest]
    fn test_batches_cover_every_key(db: ErDatabase) {
        genome(&db, "g0");
        for i in 0..(SWEEP_BATCH * 2 + 5) {
            link(&db, "Genome2Drug", "g0", i as i64 + 1);
        }
        db.insert_object("Drug", &Record::new().with("id", 1).with("name", "kept")).unwrap();
        let report = check_integrity(&db, true).unwrap();
        let to = entry(&report, "Genome2Drug", "to-link");
        assert_eq!(to.checked, SWEEP_BATCH * 2 + 5);
        assert_eq!(to.missing, SWEEP_BATCH * 2 + 4);
    }
}
