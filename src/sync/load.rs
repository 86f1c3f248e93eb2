//! Bulk loading of tab-delimited relation files.
//!
//! A load file holds one row per line with the relation's columns in field
//! order, every value already in stored form and `\N` for NULL.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::database::ErDatabase;
use crate::db::escape::{placeholders, quote_identifier};
use crate::db::Value;
use crate::error::{ErdbError, IntegrityError};
use crate::query::QueryError;
use crate::schema::compilers::SqlCompiler;
use crate::schema::{FieldType, Metadata, RelationMeta, TypeError};

/// Marks a NULL value in a load file.
pub const NULL_MARKER: &str = "\\N";

/// Rows written per `INSERT`.
const CHUNK_ROWS: usize = 500;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Delete existing rows first.
    pub truncate: bool,
    /// Drop the relation's indexes for the load and rebuild them after.
    pub defer_indexes: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadStats {
    pub relation: String,
    pub rows: u64,
    pub truncated: u64,
}

fn io_error(path: &Path, e: std::io::Error) -> ErdbError {
    ErdbError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn flush(db: &ErDatabase, relation: &RelationMeta, rows: &mut Vec<Value>) -> Result<u64, ErdbError> {
    let width = relation.fields.len();
    if rows.is_empty() || width == 0 {
        return Ok(0);
    }
    let count = rows.len() / width;
    let columns = relation
        .fields
        .iter()
        .map(|f| quote_identifier(&f.column))
        .collect::<Vec<_>>()
        .join(", ");
    let tuple = format!("({})", placeholders(width));
    let sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_identifier(&relation.sql_name),
        columns,
        vec![tuple; count].join(", ")
    );
    db.execute(&sql, rows)?;
    rows.clear();
    Ok(count as u64)
}

/// Load `path` into the relation named `relation`.
#[instrument(skip(db, path, options), fields(path = %path.display()))]
pub fn load_table(
    db: &ErDatabase,
    relation: &str,
    path: &Path,
    options: LoadOptions,
) -> Result<LoadStats, ErdbError> {
    let meta = db.metadata();
    let rel = meta.relation(relation).ok_or_else(|| QueryError::UnknownObject {
        name: relation.to_string(),
    })?;
    let types = rel
        .fields
        .iter()
        .map(|f| meta.field_type(f))
        .collect::<Result<Vec<_>, _>>()?;
    let file = File::open(path).map_err(|e| io_error(path, e))?;

    let mut stats = LoadStats {
        relation: relation.to_string(),
        ..LoadStats::default()
    };
    if options.truncate {
        stats.truncated = db.execute(&format!("DELETE FROM {}", quote_identifier(&rel.sql_name)), &[])?;
    }
    if options.defer_indexes {
        for index in &rel.indexes {
            db.connection().drop_index(&rel.sql_name, &index.sql_name)?;
        }
    }

    let mut pending = Vec::with_capacity(CHUNK_ROWS * rel.fields.len());
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| io_error(path, e))?;
        if line.is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split('\t').collect();
        if cells.len() != types.len() {
            return Err(IntegrityError::MalformedRow {
                relation: relation.to_string(),
                line: n + 1,
                expected: types.len(),
                found: cells.len(),
            }
            .into());
        }
        for (cell, ty) in cells.iter().zip(&types) {
            pending.push(if *cell == NULL_MARKER {
                Value::Null
            } else {
                ty.parse_stored(cell)?
            });
        }
        if pending.len() >= CHUNK_ROWS * types.len() {
            stats.rows += flush(db, rel, &mut pending)?;
            debug!(rows = stats.rows, "Loaded chunk");
        }
    }
    stats.rows += flush(db, rel, &mut pending)?;

    if options.defer_indexes {
        let prefix = db.connection().supports_prefix_indexes();
        for index in &rel.indexes {
            db.execute(&SqlCompiler::compile_index(meta, rel, index, prefix)?, &[])?;
        }
    }
    info!(relation, rows = stats.rows, "Loaded table");
    Ok(stats)
}

/// Options for the `sort` command that orders a load file by the relation's
/// first index, e.g. `-t $'\t' -k1,1 -k3,3n`.
pub fn sort_spec(meta: &Metadata, relation: &RelationMeta) -> Result<String, TypeError> {
    let mut keys = Vec::new();
    if let Some(index) = relation.indexes.first() {
        for field in &index.fields {
            let Some(position) = relation.fields.iter().position(|f| f.column == field.column) else {
                continue;
            };
            let modifier = meta.field_type(&relation.fields[position])?.sort_key().modifier();
            let reverse = if field.descending { "r" } else { "" };
            let column = position + 1;
            keys.push(format!("-k{column},{column}{modifier}{reverse}"));
        }
    }
    if keys.is_empty() {
        keys.push("-k1,1".to_string());
    }
    Ok(format!("-t $'\\t' {}", keys.join(" ")))
}

/// Rows a load file of `bytes` bytes is expected to hold.
pub fn estimate_rows(meta: &Metadata, relation: &RelationMeta, bytes: u64) -> Result<u64, TypeError> {
    let mut row = relation.fields.len().max(1);
    for field in &relation.fields {
        row += meta.field_type(field)?.average_size();
    }
    Ok(bytes.div_ceil(row as u64))
}
