use std::error::Error;

use serde::Serialize;

use super::CacheSchemaCmd;
use crate::commands::Execute;
use crate::database::ErDatabase;

/// Result of the cache-schema command
#[derive(Debug, Serialize)]
pub struct CacheResult {
    pub entities: usize,
    pub relationships: usize,
    pub bytes: usize,
}

impl Execute for CacheSchemaCmd {
    type Output = CacheResult;

    fn execute(self, db: &ErDatabase) -> Result<Self::Output, Box<dyn Error>> {
        db.store_metadata_cache()?;
        let meta = db.metadata();
        Ok(CacheResult {
            entities: meta.entities.len(),
            relationships: meta.relationships.len(),
            bytes: meta.to_json()?.len(),
        })
    }
}
