use std::error::Error;

use serde::Serialize;

use super::QueryCmd;
use crate::commands::Execute;
use crate::database::ErDatabase;
use crate::query::QueryError;
use crate::record::Record;

/// Result of the query command
#[derive(Debug, Serialize)]
pub struct QueryRows {
    pub objects: String,
    pub filter: String,
    pub count: u64,
    /// Selected `Object(field)` names in select order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<Record>,
}

impl Execute for QueryCmd {
    type Output = QueryRows;

    fn execute(self, db: &ErDatabase) -> Result<Self::Output, Box<dyn Error>> {
        let params = self.bound_params();
        let fields: Vec<&str> = self.fields.iter().map(String::as_str).collect();
        let fields = (!fields.is_empty()).then_some(fields.as_slice());

        let compiled = db.compile_query(&self.objects, &self.filter, fields)?;
        if compiled.param_count != params.len() {
            return Err(QueryError::ParameterCount {
                expected: compiled.param_count,
                found: params.len(),
            }
            .into());
        }

        if self.count {
            let count = db.get_count(&self.objects, &self.filter, &params)?;
            return Ok(QueryRows {
                objects: self.objects,
                filter: self.filter,
                count,
                columns: Vec::new(),
                rows: Vec::new(),
            });
        }

        let rows = db.get_all(&self.objects, &self.filter, &params, fields)?;
        Ok(QueryRows {
            count: rows.len() as u64,
            columns: compiled.columns.into_iter().map(|(name, _)| name).collect(),
            objects: self.objects,
            filter: self.filter,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::synced_db;
    use rstest::{fixture, rstest};

    #[fixture]
    fn db() -> ErDatabase {
        let db = synced_db();
        for (name, approved) in [("aspirin", true), ("placebo", false), ("ibuprofen", true)] {
            db.insert_object("Drug", &Record::new().with("name", name).with("approved", approved))
                .unwrap();
        }
        db
    }

    fn cmd(filter: &str, params: &[&str], count: bool) -> QueryCmd {
        QueryCmd {
            objects: "Drug".to_string(),
            filter: filter.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            fields: vec!["Drug(id)".to_string(), "Drug(name)".to_string()],
            count,
        }
    }

    #[rstest]
    fn test_rows_in_order(db: ErDatabase) {
        let result = cmd("ORDER BY Drug(name)", &[], false).execute(&db).unwrap();
        assert_eq!(result.count, 3);
        assert_eq!(result.columns, vec!["Drug(id)".to_string(), "Drug(name)".to_string()]);
        let names: Vec<String> = result
            .rows
            .iter()
            .map(|r| r.value("Drug(name)").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["aspirin", "ibuprofen", "placebo"]);
    }

    #[rstest]
    fn test_integer_param(db: ErDatabase) {
        let result = cmd("Drug(id) = ?", &["2"], false).execute(&db).unwrap();
        assert_eq!(result.count, 1);
        assert_eq!(result.rows[0].value("Drug(name)").unwrap().to_string(), "placebo");
    }

    #[rstest]
    fn test_count_only(db: ErDatabase) {
        let result = cmd("Drug(name) LIKE ?", &["%profen"], true).execute(&db).unwrap();
        assert_eq!(result.count, 1);
        assert!(result.rows.is_empty());
    }

    #[rstest]
    fn test_param_count_mismatch(db: ErDatabase) {
        assert!(cmd("Drug(id) = ?", &[], false).execute(&db).is_err());
    }
}
