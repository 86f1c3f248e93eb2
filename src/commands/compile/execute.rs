use serde::Serialize;

use super::CompileCmd;
use crate::query::{ColumnMap, QueryCompiler, QueryError};
use crate::schema::Metadata;

#[derive(Debug, Clone, Serialize)]
pub struct SelectedColumn {
    pub name: String,
    pub type_name: String,
    /// Relation a multi-valued field is fetched from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
}

/// Result of the compile command
#[derive(Debug, Clone, Serialize)]
pub struct CompiledSql {
    pub objects: Vec<String>,
    pub aliases: Vec<(String, String)>,
    pub select: String,
    pub count: String,
    pub params: usize,
    pub columns: Vec<SelectedColumn>,
}

impl CompileCmd {
    pub fn compile(self, meta: &Metadata) -> Result<CompiledSql, QueryError> {
        let fields: Vec<&str> = self.fields.iter().map(String::as_str).collect();
        let fields = (!fields.is_empty()).then_some(fields.as_slice());
        let query = QueryCompiler::new(meta).compile(&self.objects, &self.filter, fields)?;

        let columns = query
            .columns
            .iter()
            .map(|(name, map)| match map {
                ColumnMap::Primary { type_name, .. } => SelectedColumn {
                    name: name.clone(),
                    type_name: type_name.clone(),
                    secondary: None,
                },
                ColumnMap::Secondary {
                    relation, type_name, ..
                } => SelectedColumn {
                    name: name.clone(),
                    type_name: type_name.clone(),
                    secondary: Some(relation.clone()),
                },
            })
            .collect();

        Ok(CompiledSql {
            select: query.select_sql(),
            count: query.count_sql(),
            params: query.param_count,
            aliases: query.aliases.into_iter().collect(),
            objects: query.objects,
            columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::genome_metadata;
    use rstest::rstest;

    fn cmd(objects: &str, filter: &str, fields: &[&str]) -> CompileCmd {
        CompileCmd {
            objects: objects.to_string(),
            filter: filter.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[rstest]
    fn test_compile_counts_params() {
        let sql = cmd("Genome Feature", "Genome(genus) = ? AND Feature(id) = ?", &[])
            .compile(&genome_metadata())
            .unwrap();
        assert_eq!(sql.params, 2);
        assert_eq!(sql.objects, vec!["Genome".to_string(), "Feature".to_string()]);
        assert!(sql.select.starts_with("SELECT "));
        assert!(sql.count.starts_with("SELECT COUNT(*)"));
        // The jump token joins the two entities.
        assert!(sql.aliases.iter().any(|(name, _)| name.starts_with("GenomeHasFeature")));
    }

    #[rstest]
    fn test_selected_fields() {
        let sql = cmd("Genome", "", &["Genome(genus)", "Genome(alias)"])
            .compile(&genome_metadata())
            .unwrap();
        assert_eq!(sql.columns.len(), 2);
        assert_eq!(sql.columns[0].secondary, None);
        assert_eq!(sql.columns[1].secondary.as_deref(), Some("GenomeAlias"));
    }

    #[rstest]
    #[case("Nothing", "")]
    #[case("Genome", "Genome(nope) = ?")]
    fn test_compile_errors(#[case] objects: &str, #[case] filter: &str) {
        assert!(cmd(objects, filter, &[]).compile(&genome_metadata()).is_err());
    }
}
