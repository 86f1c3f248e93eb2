//! Output formatting for drop-all command results.

use super::execute::DropAllResult;
use crate::output::Outputable;

impl Outputable for DropAllResult {
    fn to_table(&self) -> String {
        if self.tables.is_empty() {
            return "No tables found.".to_string();
        }
        let mut output = if self.dropped {
            format!("Dropped {} tables:\n", self.tables.len())
        } else {
            format!("Would drop {} tables:\n", self.tables.len())
        };
        for table in &self.tables {
            output.push_str(&format!("  {}\n", table));
        }
        if !self.dropped {
            output.push_str("\nRe-run with --yes to drop them.\n");
        }
        output
    }
}
