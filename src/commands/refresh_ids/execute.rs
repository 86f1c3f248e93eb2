use std::error::Error;

use serde::Serialize;

use super::RefreshIdsCmd;
use crate::commands::Execute;
use crate::database::ErDatabase;
use crate::keys::{allocate_ids, refresh_id_table};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Counter {
    pub entity: String,
    pub next_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reservation {
    pub entity: String,
    pub first: i64,
    pub count: u64,
}

/// Result of the refresh-ids command
#[derive(Debug, Serialize)]
pub struct RefreshResult {
    pub counters: Vec<Counter>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reserved: Vec<Reservation>,
}

impl Execute for RefreshIdsCmd {
    type Output = RefreshResult;

    fn execute(self, db: &ErDatabase) -> Result<Self::Output, Box<dyn Error>> {
        let counters = refresh_id_table(db)?
            .into_iter()
            .map(|(entity, next_id)| Counter { entity, next_id })
            .collect();
        let mut reserved = Vec::with_capacity(self.reserve.len());
        for (entity, count) in self.reserve {
            let first = allocate_ids(db, &entity, count)?;
            reserved.push(Reservation { entity, first, count });
        }
        Ok(RefreshResult { counters, reserved })
    }
}
