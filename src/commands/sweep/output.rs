//! Output formatting for sweep command results.

use crate::output::{render_columns, Outputable};
use crate::sync::SweepReport;

impl Outputable for SweepReport {
    fn to_table(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .entries
            .iter()
            .filter(|e| e.checked > 0)
            .map(|e| {
                vec![
                    e.relationship.clone(),
                    e.link.clone(),
                    e.checked.to_string(),
                    e.missing.to_string(),
                    e.removed.to_string(),
                ]
            })
            .collect();
        let verb = if self.dry_run { "would remove" } else { "removed" };

        let mut output = render_columns(&["relationship", "link", "checked", "missing", verb], &rows);
        output.push_str(&format!("\n\nTotal {}: {}", verb, self.total_removed()));
        if self.dry_run {
            output.push_str(" (dry-run)");
        }
        output
    }
}
