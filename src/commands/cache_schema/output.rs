//! Output formatting for cache-schema command results.

use super::execute::CacheResult;
use crate::output::Outputable;

impl Outputable for CacheResult {
    fn to_table(&self) -> String {
        format!(
            "Cached schema: {} entities, {} relationships ({} bytes)",
            self.entities, self.relationships, self.bytes
        )
    }
}
