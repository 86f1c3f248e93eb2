//! Output formatting for load command results.

use super::execute::LoadResult;
use crate::output::Outputable;

impl Outputable for LoadResult {
    fn to_table(&self) -> String {
        let mut output = format!("{} <- {} ({} bytes)\n", self.relation, self.file, self.bytes);
        match self.rows {
            Some(rows) => {
                if self.truncated > 0 {
                    output.push_str(&format!("  truncated {} existing rows\n", self.truncated));
                }
                output.push_str(&format!("  loaded {} rows\n", rows));
            }
            None => {
                output.push_str(&format!("  expected rows: ~{}\n", self.estimated_rows));
                output.push_str(&format!("  sort options:  {}\n", self.sort_spec));
            }
        }
        output
    }
}
