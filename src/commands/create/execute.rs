use std::error::Error;

use serde::Serialize;

use super::CreateCmd;
use crate::commands::Execute;
use crate::database::ErDatabase;
use crate::schema::compilers::SqlCompiler;
use crate::sync::{create_missing, drop_all};

/// Status of a table after the command ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableState {
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "exists")]
    AlreadyExists,
    #[serde(rename = "would_create")]
    WouldCreate,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableStatus {
    pub name: String,
    pub status: TableState,
    /// DDL that would run, filled in dry-run mode.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<String>,
}

/// Result of the create command
#[derive(Debug, Serialize)]
pub struct CreateResult {
    pub tables: Vec<TableStatus>,
    pub dropped: Vec<String>,
    pub created_new: bool,
    pub dry_run: bool,
}

impl Execute for CreateCmd {
    type Output = CreateResult;

    fn execute(self, db: &ErDatabase) -> Result<Self::Output, Box<dyn Error>> {
        if self.dry_run {
            let prefix = db.connection().supports_prefix_indexes();
            let mut tables = Vec::new();
            for relation in db.metadata().relations.values() {
                let exists = !self.force && db.connection().table_exists(&relation.sql_name)?;
                let (status, statements) = if exists {
                    (TableState::AlreadyExists, Vec::new())
                } else {
                    let ddl = SqlCompiler::compile_relation(db.metadata(), relation, prefix)?;
                    (TableState::WouldCreate, ddl)
                };
                tables.push(TableStatus {
                    name: relation.sql_name.clone(),
                    status,
                    statements,
                });
            }
            return Ok(CreateResult {
                tables,
                dropped: Vec::new(),
                created_new: false,
                dry_run: true,
            });
        }

        let dropped = if self.force { drop_all(db)? } else { Vec::new() };
        let created = create_missing(db)?;
        let tables = db
            .metadata()
            .relations
            .values()
            .map(|relation| TableStatus {
                name: relation.sql_name.clone(),
                status: if created.contains(&relation.sql_name) {
                    TableState::Created
                } else {
                    TableState::AlreadyExists
                },
                statements: Vec::new(),
            })
            .collect();

        Ok(CreateResult {
            tables,
            dropped,
            created_new: !created.is_empty(),
            dry_run: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{memory_db, synced_db};
    use rstest::rstest;

    fn cmd(force: bool, dry_run: bool) -> CreateCmd {
        CreateCmd { force, dry_run }
    }

    #[rstest]
    fn test_creates_all_tables() {
        let db = memory_db();
        let result = cmd(false, false).execute(&db).expect("create should succeed");
        assert_eq!(result.tables.len(), 10);
        assert!(result.created_new);
        assert!(result.tables.iter().all(|t| t.status == TableState::Created));
    }

    #[rstest]
    fn test_second_run_creates_nothing() {
        let db = synced_db();
        let result = cmd(false, false).execute(&db).unwrap();
        assert!(!result.created_new);
        assert!(result.tables.iter().all(|t| t.status == TableState::AlreadyExists));
    }

    #[rstest]
    fn test_dry_run_leaves_database_untouched() {
        let db = memory_db();
        let result = cmd(false, true).execute(&db).unwrap();
        assert!(result.dry_run);
        assert!(result.tables.iter().all(|t| t.status == TableState::WouldCreate));
        let genome = result.tables.iter().find(|t| t.name == "genome").unwrap();
        assert!(genome.statements[0].starts_with("CREATE TABLE"));
        assert!(db.connection().table_names().unwrap().is_empty());
    }

    #[rstest]
    fn test_force_recreates() {
        let db = synced_db();
        db.execute("CREATE TABLE stray (x INTEGER)", &[]).unwrap();
        let result = cmd(true, false).execute(&db).unwrap();
        assert!(result.dropped.contains(&"stray".to_string()));
        assert!(result.tables.iter().all(|t| t.status == TableState::Created));
        assert!(!db.connection().table_exists("stray").unwrap());
    }
}
