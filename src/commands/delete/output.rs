//! Output formatting for delete command results.

use super::execute::DeleteResult;
use crate::output::Outputable;

impl Outputable for DeleteResult {
    fn to_table(&self) -> String {
        let mut output = format!("{} {}", self.entity, self.id);
        if !self.existed {
            output.push_str(" (not found)");
        }
        output.push_str("\n\n");

        if !self.executed {
            output.push_str("Delete paths, in execution order:\n");
            for (i, path) in self.plan.iter().enumerate() {
                output.push_str(&format!("  {:>2}. {}\n", i + 1, path.path));
            }
            output.push_str("\nNo changes made (plan only).\n");
            return output;
        }

        let total: u64 = self.deleted.values().sum();
        output.push_str(&format!("Deleted {} rows:\n", total));
        for (object, rows) in self.deleted.iter().filter(|(_, rows)| **rows > 0) {
            output.push_str(&format!("  {}: {}\n", object, rows));
        }
        for (relationship, rows) in self.cleared.iter().filter(|(_, rows)| **rows > 0) {
            output.push_str(&format!("  {} links cleared: {}\n", relationship, rows));
        }
        output
    }
}
