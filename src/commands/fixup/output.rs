//! Output formatting for fixup command results.

use crate::output::{render_columns, Outputable};
use crate::sync::{FixupAction, SyncReport};

fn describe(action: &FixupAction) -> (&'static str, String) {
    match action {
        FixupAction::Created => ("created", String::new()),
        FixupAction::Recreated => ("recreated", "table was empty".to_string()),
        FixupAction::Unchanged => ("unchanged", String::new()),
        FixupAction::Unreconciled { reason } => ("UNRECONCILED", reason.clone()),
        FixupAction::Indexes {
            added,
            dropped,
            rebuilt,
        } => {
            let mut parts = Vec::new();
            if !added.is_empty() {
                parts.push(format!("added {}", added.join(", ")));
            }
            if !dropped.is_empty() {
                parts.push(format!("dropped {}", dropped.join(", ")));
            }
            if !rebuilt.is_empty() {
                parts.push(format!("rebuilt {}", rebuilt.join(", ")));
            }
            ("indexes", parts.join("; "))
        }
    }
}

impl Outputable for SyncReport {
    fn to_table(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .tables
            .iter()
            .map(|t| {
                let (action, detail) = describe(&t.action);
                vec![t.table.clone(), action.to_string(), detail]
            })
            .collect();
        let mut output = render_columns(&["table", "action", "detail"], &rows);

        let unreconciled = self.unreconciled().count();
        if unreconciled > 0 {
            output.push_str(&format!(
                "\n\n{} table(s) hold rows that no longer match the schema and were left as they are.",
                unreconciled
            ));
        }
        output
    }
}
