use std::error::Error;

use serde::Serialize;

use super::DropAllCmd;
use crate::commands::Execute;
use crate::database::ErDatabase;
use crate::sync::drop_all;

/// Result of the drop-all command
#[derive(Debug, Serialize)]
pub struct DropAllResult {
    pub tables: Vec<String>,
    pub dropped: bool,
}

impl Execute for DropAllCmd {
    type Output = DropAllResult;

    fn execute(self, db: &ErDatabase) -> Result<Self::Output, Box<dyn Error>> {
        if !self.yes {
            return Ok(DropAllResult {
                tables: db.connection().table_names()?,
                dropped: false,
            });
        }
        Ok(DropAllResult {
            tables: drop_all(db)?,
            dropped: true,
        })
    }
}
