//! Output formatting for check command results.

use super::execute::SchemaSummary;
use crate::output::{render_columns, Outputable};
use crate::schema::Arity;

impl Outputable for SchemaSummary {
    fn to_table(&self) -> String {
        let mut output = format!(
            "Schema: {} entities, {} relationships, {} tables, {} join paths\n\n",
            self.entities.len(),
            self.relationships.len(),
            self.tables,
            self.crossings
        );

        let rows: Vec<Vec<String>> = self
            .entities
            .iter()
            .map(|e| {
                vec![
                    e.name.clone(),
                    format!("{}{}", e.key_type, if e.autocounter { " (auto)" } else { "" }),
                    e.fields.to_string(),
                    e.relations.join(", "),
                ]
            })
            .collect();
        output.push_str(&render_columns(&["entity", "key", "fields", "relations"], &rows));
        output.push_str("\n\n");

        let rows: Vec<Vec<String>> = self
            .relationships
            .iter()
            .map(|r| {
                let arity = match r.arity {
                    Arity::OneToMany => "1M",
                    Arity::ManyToMany => "MM",
                };
                let mut flags = Vec::new();
                if r.embedded {
                    flags.push("embedded");
                }
                if r.loose {
                    flags.push("loose");
                }
                vec![
                    format!("{} / {}", r.name, r.converse),
                    format!("{} -> {}", r.from, r.to),
                    arity.to_string(),
                    flags.join(", "),
                ]
            })
            .collect();
        output.push_str(&render_columns(&["relationship", "ends", "arity", "flags"], &rows));

        if !self.jumps.is_empty() {
            output.push_str("\n\nJumps:\n");
            for jump in &self.jumps {
                output.push_str(&format!("  {} -> {} via {}\n", jump.from, jump.to, jump.via));
            }
        }
        output
    }
}
