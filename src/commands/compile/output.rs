//! Output formatting for compile command results.

use super::execute::CompiledSql;
use crate::output::{render_columns, Outputable};

impl Outputable for CompiledSql {
    fn to_table(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("Objects: {}\n", self.objects.join(" ")));
        output.push_str(&format!("Parameters: {}\n\n", self.params));
        output.push_str(&format!("{}\n\n", self.select));
        output.push_str(&format!("{}\n\n", self.count));

        let rows: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|c| {
                vec![
                    c.name.clone(),
                    c.type_name.clone(),
                    c.secondary.clone().unwrap_or_default(),
                ]
            })
            .collect();
        output.push_str(&render_columns(&["column", "type", "fetched from"], &rows));
        output
    }
}
