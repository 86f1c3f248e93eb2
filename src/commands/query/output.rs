//! Output formatting for query command results.

use super::execute::QueryRows;
use crate::output::{render_columns, Outputable};

impl Outputable for QueryRows {
    fn to_table(&self) -> String {
        if self.columns.is_empty() {
            return format!("{} matching rows", self.count);
        }
        if self.rows.is_empty() {
            return "No rows found.".to_string();
        }
        let headers: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|record| {
                self.columns
                    .iter()
                    .map(|column| {
                        record
                            .values(column)
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .collect()
            })
            .collect();
        format!("{}\n\n{} rows", render_columns(&headers, &rows), self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    #[test]
    fn test_multi_valued_cells_joined() {
        let result = QueryRows {
            objects: "Genome".to_string(),
            filter: String::new(),
            count: 1,
            columns: vec!["Genome(id)".to_string(), "Genome(alias)".to_string()],
            rows: vec![Record::new()
                .with("Genome(id)", "83333.1")
                .with("Genome(alias)", "K-12")
                .with("Genome(alias)", "MG1655")],
        };
        let output = result.to_table();
        assert!(output.contains("83333.1     K-12, MG1655"));
        assert!(output.ends_with("1 rows"));
    }

    #[test]
    fn test_count_only() {
        let result = QueryRows {
            objects: "Drug".to_string(),
            filter: String::new(),
            count: 4,
            columns: vec![],
            rows: vec![],
        };
        assert_eq!(result.to_table(), "4 matching rows");
    }
}
