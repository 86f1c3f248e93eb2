use std::error::Error;
use std::fs;

use serde::Serialize;

use super::LoadCmd;
use crate::commands::Execute;
use crate::database::ErDatabase;
use crate::error::ErdbError;
use crate::query::QueryError;
use crate::sync::{estimate_rows, load_table, sort_spec, LoadOptions};

/// Result of the load command
#[derive(Debug, Serialize)]
pub struct LoadResult {
    pub relation: String,
    pub file: String,
    pub bytes: u64,
    pub estimated_rows: u64,
    pub sort_spec: String,
    /// `None` when only inspected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    pub truncated: u64,
}

impl Execute for LoadCmd {
    type Output = LoadResult;

    fn execute(self, db: &ErDatabase) -> Result<Self::Output, Box<dyn Error>> {
        let meta = db.metadata();
        let relation = meta
            .relation(&self.relation)
            .ok_or_else(|| QueryError::UnknownObject {
                name: self.relation.clone(),
            })?;
        let bytes = fs::metadata(&self.file)
            .map_err(|e| ErdbError::Io {
                path: self.file.display().to_string(),
                message: e.to_string(),
            })?
            .len();

        let mut result = LoadResult {
            relation: self.relation.clone(),
            file: self.file.display().to_string(),
            bytes,
            estimated_rows: estimate_rows(meta, relation, bytes)?,
            sort_spec: sort_spec(meta, relation)?,
            rows: None,
            truncated: 0,
        };
        if self.inspect {
            return Ok(result);
        }

        let options = LoadOptions {
            truncate: self.truncate,
            defer_indexes: self.defer_indexes,
        };
        let stats = load_table(db, &self.relation, &self.file, options)?;
        result.rows = Some(stats.rows);
        result.truncated = stats.truncated;
        Ok(result)
    }
}
