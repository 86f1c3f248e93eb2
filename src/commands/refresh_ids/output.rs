//! Output formatting for refresh-ids command results.

use super::execute::RefreshResult;
use crate::output::{render_columns, Outputable};

impl Outputable for RefreshResult {
    fn to_table(&self) -> String {
        if self.counters.is_empty() {
            return "No autocounter entities in the schema.".to_string();
        }
        let rows: Vec<Vec<String>> = self
            .counters
            .iter()
            .map(|c| vec![c.entity.clone(), c.next_id.to_string()])
            .collect();
        let mut output = render_columns(&["entity", "next id"], &rows);
        for r in &self.reserved {
            let last = r.first + r.count as i64 - 1;
            output.push_str(&format!("\nReserved {} ids for {}: {}..={}", r.count, r.entity, r.first, last));
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::refresh_ids::execute::{Counter, Reservation};

    #[test]
    fn test_reservation_range() {
        let result = RefreshResult {
            counters: vec![Counter {
                entity: "Drug".to_string(),
                next_id: 5,
            }],
            reserved: vec![Reservation {
                entity: "Drug".to_string(),
                first: 5,
                count: 10,
            }],
        };
        let output = result.to_table();
        assert!(output.contains("Drug    5"));
        assert!(output.ends_with("Reserved 10 ids for Drug: 5..=14"));
    }
}
