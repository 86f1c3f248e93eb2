//! Output formatting for create command results.

use super::execute::{CreateResult, TableState};
use crate::output::Outputable;

impl Outputable for CreateResult {
    fn to_table(&self) -> String {
        let mut output = String::new();

        if self.dry_run {
            output.push_str("Table creation (dry-run):\n");
        } else {
            output.push_str("Table creation:\n");
        }
        if !self.dropped.is_empty() {
            output.push_str(&format!("  dropped {} existing tables\n", self.dropped.len()));
        }

        for table in &self.tables {
            let (symbol, status_text) = match table.status {
                TableState::Created => ("✓", "created"),
                TableState::AlreadyExists => ("✓", "exists"),
                TableState::WouldCreate => ("→", "would create"),
            };
            output.push_str(&format!("  {} {} ({})\n", symbol, table.name, status_text));
            for statement in &table.statements {
                output.push_str(&format!("      {}\n", statement));
            }
        }

        if self.dry_run {
            output.push_str("\nNo changes made (dry-run mode).\n");
        } else if self.created_new {
            output.push_str("\nDatabase ready.\n");
        } else {
            output.push_str("\nDatabase already up to date.\n");
        }
        output
    }
}
