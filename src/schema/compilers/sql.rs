//! SQL DDL compiler.
//!
//! Generates `CREATE TABLE` and `CREATE INDEX` statements from compiled
//! relations. The output format is deterministic so that tests can compare it
//! verbatim.

use crate::db::escape::{placeholders, quote_identifier};
use crate::schema::metadata::{IndexMeta, Metadata, RelationMeta};
use crate::schema::types::{FieldType, TypeError};

/// Compiler for generating SQL statements from relation metadata.
pub struct SqlCompiler;

impl SqlCompiler {
    /// Generate DDL for a single relation.
    ///
    /// Produces output in the format:
    /// ```sql
    /// CREATE TABLE "genome" (
    ///     "id" VARCHAR(250) NOT NULL,
    ///     "genus" VARCHAR(250) NOT NULL
    /// )
    /// ```
    pub fn compile_table(meta: &Metadata, relation: &RelationMeta) -> Result<String, TypeError> {
        let columns = relation
            .fields
            .iter()
            .map(|f| {
                let ty = meta.field_type(f)?;
                let null = if f.nullable || ty.nullable() {
                    "NULL"
                } else {
                    "NOT NULL"
                };
                Ok(format!(
                    "    {} {} {}",
                    quote_identifier(&f.column),
                    ty.sql_type(),
                    null
                ))
            })
            .collect::<Result<Vec<_>, TypeError>>()?
            .join(",\n");

        Ok(format!(
            "CREATE TABLE {} (\n{}\n)",
            quote_identifier(&relation.sql_name),
            columns
        ))
    }

    /// Generate `CREATE INDEX` for one index of a relation.
    ///
    /// Prefix modifiers such as `(250)` are only emitted when the connection
    /// accepts them; otherwise the whole column is indexed.
    pub fn compile_index(
        meta: &Metadata,
        relation: &RelationMeta,
        index: &IndexMeta,
        prefix_indexes: bool,
    ) -> Result<String, TypeError> {
        let columns = index
            .fields
            .iter()
            .map(|f| {
                let mut column = quote_identifier(&f.column);
                if prefix_indexes {
                    if let Some(field) = relation.fields.iter().find(|rf| rf.column == f.column) {
                        column.push_str(meta.field_type(field)?.index_mod().unwrap_or_default());
                    }
                }
                if f.descending {
                    column.push_str(" DESC");
                }
                Ok(column)
            })
            .collect::<Result<Vec<_>, TypeError>>()?
            .join(", ");

        Ok(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            quote_identifier(&index.sql_name),
            quote_identifier(&relation.sql_name),
            columns
        ))
    }

    /// Generate the table and all of its indexes.
    pub fn compile_relation(
        meta: &Metadata,
        relation: &RelationMeta,
        prefix_indexes: bool,
    ) -> Result<Vec<String>, TypeError> {
        let mut statements = vec![Self::compile_table(meta, relation)?];
        for index in &relation.indexes {
            statements.push(Self::compile_index(meta, relation, index, prefix_indexes)?);
        }
        Ok(statements)
    }

    /// Generate a positional insert of every column in field order.
    ///
    /// ```sql
    /// INSERT INTO "genome_alias" ("id", "alias") VALUES (?, ?)
    /// ```
    pub fn compile_insert(relation: &RelationMeta) -> String {
        let columns = relation
            .fields
            .iter()
            .map(|f| quote_identifier(&f.column))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&relation.sql_name),
            columns,
            placeholders(relation.fields.len())
        )
    }
}
