use std::collections::BTreeMap;
use std::error::Error;

use serde::Serialize;

use super::DeleteCmd;
use crate::commands::Execute;
use crate::database::ErDatabase;
use crate::delete::{delete_entity, plan_delete, DeleteMode};
use crate::query::QueryError;
use crate::schema::{FieldType, FIELD_ID};

#[derive(Debug, Clone, Serialize)]
pub struct PlannedPath {
    pub path: String,
    pub objects: Vec<String>,
}

/// Result of the delete command
#[derive(Debug, Serialize)]
pub struct DeleteResult {
    pub entity: String,
    pub id: String,
    pub existed: bool,
    /// Paths in execution order.
    pub plan: Vec<PlannedPath>,
    pub executed: bool,
    pub deleted: BTreeMap<String, u64>,
    pub cleared: BTreeMap<String, u64>,
}

impl Execute for DeleteCmd {
    type Output = DeleteResult;

    fn execute(self, db: &ErDatabase) -> Result<Self::Output, Box<dyn Error>> {
        let meta = db.metadata();
        let field = meta
            .field(&self.entity, FIELD_ID)
            .ok_or_else(|| QueryError::UnknownObject {
                name: self.entity.clone(),
            })?;
        let ty = meta.field_type(field)?;
        let id = ty.decode(&ty.parse_stored(&self.id)?)?;

        let mode = DeleteMode::from(self.mode);
        let plan = plan_delete(meta, &self.entity, mode)?
            .iter()
            .map(|p| PlannedPath {
                path: p.to_string(),
                objects: p.objects(meta),
            })
            .collect();
        let existed = db.exists(&self.entity, &id)?;

        let mut result = DeleteResult {
            entity: self.entity,
            id: self.id,
            existed,
            plan,
            executed: false,
            deleted: BTreeMap::new(),
            cleared: BTreeMap::new(),
        };
        if self.plan {
            return Ok(result);
        }

        let stats = delete_entity(db, &result.entity, &id, mode)?;
        result.executed = true;
        result.deleted = stats.deleted;
        result.cleared = stats.cleared;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::delete::ModeArg;
    use crate::record::Record;
    use crate::test_utils::synced_db;
    use rstest::{fixture, rstest};

    #[fixture]
    fn db() -> ErDatabase {
        let db = synced_db();
        db.insert_object(
            "Genome",
            &Record::new().with("id", "g1").with("genus", "Escherichia").with("species", "coli"),
        )
        .unwrap();
        for f in ["f1", "f2"] {
            db.insert_object("Feature", &Record::new().with("id", f)).unwrap();
            db.insert_object(
                "GenomeHasFeature",
                &Record::new().with("from-link", "g1").with("to-link", f),
            )
            .unwrap();
        }
        db
    }

    fn cmd(entity: &str, id: &str, mode: ModeArg, plan: bool) -> DeleteCmd {
        DeleteCmd {
            entity: entity.to_string(),
            id: id.to_string(),
            mode,
            plan,
        }
    }

    #[rstest]
    fn test_plan_changes_nothing(db: ErDatabase) {
        let result = cmd("Genome", "g1", ModeArg::Full, true).execute(&db).unwrap();
        assert!(result.existed);
        assert!(!result.executed);
        assert!(result.plan.len() > 1);
        assert_eq!(result.plan.last().unwrap().path, "Genome");
        assert_eq!(db.get_count("Feature", "", &[]).unwrap(), 2);
    }

    #[rstest]
    fn test_full_delete(db: ErDatabase) {
        let result = cmd("Genome", "g1", ModeArg::Full, false).execute(&db).unwrap();
        assert!(result.executed);
        assert_eq!(result.deleted.get("Genome"), Some(&1));
        assert_eq!(result.deleted.get("Feature"), Some(&2));
        assert_eq!(result.deleted.get("GenomeHasFeature"), Some(&2));
        assert_eq!(db.get_count("Feature", "", &[]).unwrap(), 0);
    }

    #[rstest]
    fn test_keep_root(db: ErDatabase) {
        cmd("Genome", "g1", ModeArg::KeepRoot, false).execute(&db).unwrap();
        assert_eq!(db.get_count("Genome", "", &[]).unwrap(), 1);
        assert_eq!(db.get_count("Feature", "", &[]).unwrap(), 0);
    }

    #[rstest]
    fn test_missing_instance_is_reported(db: ErDatabase) {
        let result = cmd("Genome", "nope", ModeArg::Full, false).execute(&db).unwrap();
        assert!(!result.existed);
        assert_eq!(result.deleted.values().sum::<u64>(), 0);
    }

    #[rstest]
    fn test_integer_key_parsed(db: ErDatabase) {
        let id = db.insert_object("Drug", &Record::new().with("name", "aspirin")).unwrap();
        let result = cmd("Drug", &id.to_string(), ModeArg::OnlyRoot, false)
            .execute(&db)
            .unwrap();
        assert_eq!(result.deleted.get("Drug"), Some(&1));
    }

    #[rstest]
    fn test_unknown_entity(db: ErDatabase) {
        assert!(cmd("Nope", "1", ModeArg::Full, false).execute(&db).is_err());
    }
}
