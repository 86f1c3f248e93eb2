use std::error::Error;

use super::FixupCmd;
use crate::commands::Execute;
use crate::database::ErDatabase;
use crate::sync::{fixup_all, fixup_table, SyncReport, TableFixup};

impl Execute for FixupCmd {
    type Output = SyncReport;

    fn execute(self, db: &ErDatabase) -> Result<Self::Output, Box<dyn Error>> {
        let Some(name) = self.table else {
            return Ok(fixup_all(db)?);
        };
        let action = fixup_table(db, &name)?;
        let table = db
            .metadata()
            .relation(&name)
            .map(|r| r.sql_name.clone())
            .unwrap_or(name);
        Ok(SyncReport {
            tables: vec![TableFixup { table, action }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::FixupAction;
    use crate::test_utils::{memory_db, synced_db};
    use rstest::rstest;

    #[rstest]
    fn test_fixup_all_on_empty_database_creates_everything() {
        let db = memory_db();
        let report = FixupCmd { table: None }.execute(&db).unwrap();
        assert_eq!(report.tables.len(), 10);
        assert!(report.tables.iter().all(|t| t.action == FixupAction::Created));
    }

    #[rstest]
    #[case("Genome")]
    #[case("genome")]
    fn test_single_table_by_either_name(#[case] name: &str) {
        let db = synced_db();
        let report = FixupCmd {
            table: Some(name.to_string()),
        }
        .execute(&db)
        .unwrap();
        assert_eq!(report.tables.len(), 1);
        assert_eq!(report.tables[0].table, "genome");
        assert_eq!(report.tables[0].action, FixupAction::Unchanged);
    }

    #[rstest]
    fn test_unknown_table() {
        let db = synced_db();
        let result = FixupCmd {
            table: Some("Nope".to_string()),
        }
        .execute(&db);
        assert!(result.is_err());
    }
}
