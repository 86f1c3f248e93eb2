//! Schema synchronization.
//!
//! Converges the live database onto the compiled metadata:
//!
//! - [`create_missing`] creates every relation that has no table yet
//! - [`drop_all`] drops every non-system table
//! - [`fixup_table`] / [`fixup_all`] diff live columns and indexes against the
//!   relation and repair what can be repaired without losing data
//! - [`check_integrity`] removes rows whose relationship endpoints are gone
//! - [`load_table`] bulk-loads a relation from a tab-delimited file
//!
//! Nothing here runs inside a transaction. Every operation is safe to repeat
//! after a partial run.

mod integrity;
mod load;

pub use integrity::{check_integrity, SweepEntry, SweepReport, SWEEP_BATCH};
pub use load::{estimate_rows, load_table, sort_spec, LoadOptions, LoadStats, NULL_MARKER};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::database::ErDatabase;
use crate::db::escape::quote_identifier;
use crate::db::{normalize_sql_type, IndexInfo};
use crate::error::ErdbError;
use crate::query::QueryError;
use crate::schema::compilers::SqlCompiler;
use crate::schema::{FieldType, IndexMeta, RelationMeta};

/// What [`fixup_table`] did to one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FixupAction {
    /// The table did not exist.
    Created,
    /// Columns differed and the table was empty, so it was dropped and created.
    Recreated,
    /// Columns matched; indexes were brought in line.
    Indexes {
        added: Vec<String>,
        dropped: Vec<String>,
        rebuilt: Vec<String>,
    },
    Unchanged,
    /// Columns differ but the table holds rows.
    Unreconciled { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableFixup {
    pub table: String,
    #[serde(flatten)]
    pub action: FixupAction,
}

/// Outcome of [`fixup_all`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub tables: Vec<TableFixup>,
}

impl SyncReport {
    /// Tables left for an operator to repair.
    pub fn unreconciled(&self) -> impl Iterator<Item = &TableFixup> {
        self.tables
            .iter()
            .filter(|t| matches!(t.action, FixupAction::Unreconciled { .. }))
    }

    pub fn is_clean(&self) -> bool {
        self.unreconciled().next().is_none()
    }
}

fn create_relation(db: &ErDatabase, relation: &RelationMeta) -> Result<(), ErdbError> {
    let prefix = db.connection().supports_prefix_indexes();
    for statement in SqlCompiler::compile_relation(db.metadata(), relation, prefix)? {
        debug!(sql = %statement, "DDL");
        db.execute(&statement, &[])?;
    }
    Ok(())
}

/// Create a table (and its indexes) for every relation without one.
///
/// Returns the SQL names of the tables created.
#[instrument(skip_all)]
pub fn create_missing(db: &ErDatabase) -> Result<Vec<String>, ErdbError> {
    let mut created = Vec::new();
    for relation in db.metadata().relations.values() {
        if db.connection().table_exists(&relation.sql_name)? {
            continue;
        }
        create_relation(db, relation)?;
        created.push(relation.sql_name.clone());
    }
    info!(created = created.len(), "Created missing tables");
    Ok(created)
}

/// Drop every live non-system table, including reserved ones.
#[instrument(skip_all)]
pub fn drop_all(db: &ErDatabase) -> Result<Vec<String>, ErdbError> {
    let tables = db.connection().table_names()?;
    for table in &tables {
        db.connection().drop_table(table)?;
    }
    warn!(dropped = tables.len(), "Dropped all tables");
    Ok(tables)
}

fn find_relation<'m>(db: &'m ErDatabase, name: &str) -> Result<&'m RelationMeta, QueryError> {
    let meta = db.metadata();
    meta.relation(name)
        .or_else(|| meta.relations.values().find(|r| r.sql_name == name))
        .ok_or_else(|| QueryError::UnknownObject {
            name: name.to_string(),
        })
}

/// First difference between the live columns and the relation's fields.
fn column_mismatch(db: &ErDatabase, relation: &RelationMeta) -> Result<Option<String>, ErdbError> {
    let live = db.connection().columns(&relation.sql_name)?;
    if live.len() != relation.fields.len() {
        return Ok(Some(format!(
            "expected {} columns, found {}",
            relation.fields.len(),
            live.len()
        )));
    }
    for (field, column) in relation.fields.iter().zip(&live) {
        let ty = db.metadata().field_type(field)?;
        let sql_type = normalize_sql_type(&ty.sql_type());
        let nullable = field.nullable || ty.nullable();
        if column.name != field.column {
            return Ok(Some(format!("expected column {}, found {}", field.column, column.name)));
        }
        if column.sql_type != sql_type {
            return Ok(Some(format!(
                "column {} has type {}, expected {}",
                column.name, column.sql_type, sql_type
            )));
        }
        if column.nullable != nullable {
            return Ok(Some(format!(
                "column {} nullability differs ({} live)",
                column.name,
                if column.nullable { "NULL" } else { "NOT NULL" }
            )));
        }
    }
    Ok(None)
}

fn is_empty(db: &ErDatabase, table: &str) -> Result<bool, ErdbError> {
    let sql = format!("SELECT 1 FROM {} LIMIT 1", quote_identifier(table));
    Ok(db.query(&sql, &[])?.rows.is_empty())
}

fn index_matches(expected: &IndexMeta, live: &IndexInfo) -> bool {
    expected.unique == live.unique
        && expected.fields.len() == live.columns.len()
        && expected
            .fields
            .iter()
            .zip(&live.columns)
            .all(|(e, l)| e.column == l.name && e.descending == l.descending)
}

fn reconcile_indexes(db: &ErDatabase, relation: &RelationMeta) -> Result<FixupAction, ErdbError> {
    let conn = db.connection();
    let prefix = conn.supports_prefix_indexes();
    let live = conn.indexes(&relation.sql_name)?;
    let (mut added, mut dropped, mut rebuilt) = (Vec::new(), Vec::new(), Vec::new());

    for index in &live {
        if !relation.indexes.iter().any(|i| i.sql_name == index.name) {
            conn.drop_index(&relation.sql_name, &index.name)?;
            dropped.push(index.name.clone());
        }
    }
    for index in &relation.indexes {
        let create = SqlCompiler::compile_index(db.metadata(), relation, index, prefix)?;
        match live.iter().find(|l| l.name == index.sql_name) {
            Some(existing) if index_matches(index, existing) => {}
            Some(_) => {
                conn.drop_index(&relation.sql_name, &index.sql_name)?;
                db.execute(&create, &[])?;
                rebuilt.push(index.sql_name.clone());
            }
            None => {
                db.execute(&create, &[])?;
                added.push(index.sql_name.clone());
            }
        }
    }

    if added.is_empty() && dropped.is_empty() && rebuilt.is_empty() {
        Ok(FixupAction::Unchanged)
    } else {
        Ok(FixupAction::Indexes {
            added,
            dropped,
            rebuilt,
        })
    }
}

/// Bring one table in line with its relation.
///
/// `name` may be the relation's logical name or its SQL table name.
#[instrument(skip(db))]
pub fn fixup_table(db: &ErDatabase, name: &str) -> Result<FixupAction, ErdbError> {
    let relation = find_relation(db, name)?;
    if !db.connection().table_exists(&relation.sql_name)? {
        create_relation(db, relation)?;
        info!(table = %relation.sql_name, "Created table");
        return Ok(FixupAction::Created);
    }

    let action = match column_mismatch(db, relation)? {
        None => reconcile_indexes(db, relation)?,
        Some(reason) if is_empty(db, &relation.sql_name)? => {
            info!(table = %relation.sql_name, %reason, "Recreating empty table");
            db.connection().drop_table(&relation.sql_name)?;
            create_relation(db, relation)?;
            FixupAction::Recreated
        }
        Some(reason) => {
            warn!(table = %relation.sql_name, %reason, "Table cannot be reconciled");
            FixupAction::Unreconciled { reason }
        }
    };
    Ok(action)
}

/// Run [`fixup_table`] over every relation.
#[instrument(skip_all)]
pub fn fixup_all(db: &ErDatabase) -> Result<SyncReport, ErdbError> {
    let mut report = SyncReport::default();
    let names: Vec<String> = db.metadata().relations.keys().cloned().collect();
    for name in names {
        let action = fixup_table(db, &name)?;
        let table = find_relation(db, &name)?.sql_name.clone();
        report.tables.push(TableFixup { table, action });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::test_utils::memory_db;
    use rstest::{fixture, rstest};

    #[fixture]
    fn db() -> ErDatabase {
        let db = memory_db();
        create_missing(&db).unwrap();
        db
    }

    #[rstest]
    fn test_create_missing_is_idempotent(db: ErDatabase) {
        let tables = db.connection().table_names().unwrap();
        for table in ["genome", "genome_alias", "genome2_drug", "annotation"] {
            assert!(tables.contains(&table.to_string()), "{table} missing");
        }
        // Embedded relationships have no table of their own.
        assert!(!tables.contains(&"feature_has_annotation".to_string()));
        assert!(create_missing(&db).unwrap().is_empty());
    }

    #[rstest]
    fn test_fixup_clean_schema_is_unchanged(db: ErDatabase) {
        let report = fixup_all(&db).unwrap();
        assert!(report.is_clean());
        assert!(report.tables.iter().all(|t| t.action == FixupAction::Unchanged));
    }

    #[rstest]
    fn test_fixup_creates_dropped_table(db: ErDatabase) {
        db.connection().drop_table("subsystem").unwrap();
        assert_eq!(fixup_table(&db, "Subsystem").unwrap(), FixupAction::Created);
        assert!(db.connection().table_exists("subsystem").unwrap());
    }

    #[rstest]
    fn test_fixup_repairs_indexes_only(db: ErDatabase) {
        db.insert_object(
            "Genome",
            &Record::new().with("id", "g1").with("genus", "Escherichia").with("species", "coli"),
        )
        .unwrap();
        db.connection().drop_index("genome", "genome_idx_name").unwrap();
        db.execute("CREATE INDEX \"stray\" ON \"genome\" (\"domain\")", &[]).unwrap();

        assert_eq!(
            fixup_table(&db, "genome").unwrap(),
            FixupAction::Indexes {
                added: vec!["genome_idx_name".to_string()],
                dropped: vec!["stray".to_string()],
                rebuilt: vec![],
            }
        );
        assert_eq!(fixup_table(&db, "Genome").unwrap(), FixupAction::Unchanged);
        assert!(db.exists("Genome", &"g1".into()).unwrap());
    }

    #[rstest]
    fn test_fixup_rebuilds_changed_uniqueness(db: ErDatabase) {
        db.connection().drop_index("drug", "drug_idx_drug_name").unwrap();
        db.execute("CREATE INDEX \"drug_idx_drug_name\" ON \"drug\" (\"name\")", &[])
            .unwrap();
        assert_eq!(
            fixup_table(&db, "Drug").unwrap(),
            FixupAction::Indexes {
                added: vec![],
                dropped: vec![],
                rebuilt: vec!["drug_idx_drug_name".to_string()],
            }
        );
        let live = db.connection().indexes("drug").unwrap();
        assert!(live.iter().any(|i| i.name == "drug_idx_drug_name" && i.unique));
    }

    #[rstest]
    fn test_column_mismatch_on_empty_table_recreates(db: ErDatabase) {
        db.connection().drop_table("subsystem").unwrap();
        db.execute("CREATE TABLE \"subsystem\" (\"id\" VARCHAR(250) NOT NULL)", &[])
            .unwrap();
        assert_eq!(fixup_table(&db, "Subsystem").unwrap(), FixupAction::Recreated);
        assert_eq!(db.connection().columns("subsystem").unwrap().len(), 3);
    }

    #[rstest]
    fn test_column_mismatch_with_rows_is_reported(db: ErDatabase) {
        db.connection().drop_table("subsystem").unwrap();
        db.execute("CREATE TABLE \"subsystem\" (\"id\" VARCHAR(250) NOT NULL)", &[])
            .unwrap();
        db.execute("INSERT INTO \"subsystem\" VALUES ('s1')", &[]).unwrap();

        let report = fixup_all(&db).unwrap();
        let unreconciled: Vec<_> = report.unreconciled().map(|t| t.table.as_str()).collect();
        assert_eq!(unreconciled, vec!["subsystem"]);
        assert!(!report.is_clean());
        assert_eq!(db.connection().columns("subsystem").unwrap().len(), 1);
    }

    #[rstest]
    fn test_drop_all(db: ErDatabase) {
        db.insert_object("Drug", &Record::new().with("name", "aspirin")).unwrap();
        let dropped = drop_all(&db).unwrap();
        assert!(dropped.contains(&"_id_counters".to_string()));
        assert!(db.connection().table_names().unwrap().is_empty());
    }

    #[rstest]
    fn test_fixup_unknown_relation(db: ErDatabase) {
        assert!(matches!(
            fixup_table(&db, "Nope"),
            Err(ErdbError::Query(QueryError::UnknownObject { .. }))
        ));
    }
}
