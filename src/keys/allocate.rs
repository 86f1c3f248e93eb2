//! Surrogate key allocation.
//!
//! Each autocounter entity has one row in [`COUNTER_TABLE`] holding the next
//! unallocated key. Allocation reads the row and advances it with a conditional
//! update; a writer that lost the race reads again. The conditional update is
//! exposed as [`compare_and_swap`] so other counters can reuse it.

use tracing::{debug, info, instrument, warn};

use crate::database::ErDatabase;
use crate::db::escape::quote_identifier;
use crate::db::{DbError, Value};
use crate::error::{ErdbError, IntegrityError};
use crate::schema::FIELD_ID;

/// Reserved table holding one `next_id` row per autocounter entity.
pub const COUNTER_TABLE: &str = "_id_counters";

/// Set `column` to `new` in the row of `table` whose `key_column` equals `key`,
/// but only if `column` still equals `expected`.
///
/// Returns whether the row was updated.
pub fn compare_and_swap(
    db: &ErDatabase,
    table: &str,
    key_column: &str,
    key: &Value,
    column: &str,
    expected: &Value,
    new: &Value,
) -> Result<bool, DbError> {
    let sql = format!(
        "UPDATE {table} SET {col} = ? WHERE {key} = ? AND {col} = ?",
        table = quote_identifier(table),
        col = quote_identifier(column),
        key = quote_identifier(key_column),
    );
    let affected = db.execute(&sql, &[new.clone(), key.clone(), expected.clone()])?;
    Ok(affected == 1)
}

pub(crate) fn ensure_counter_table(db: &ErDatabase) -> Result<(), DbError> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\"entity\" VARCHAR(250) NOT NULL PRIMARY KEY, \"next_id\" BIGINT NOT NULL)",
        quote_identifier(COUNTER_TABLE)
    );
    db.execute(&sql, &[]).map(|_| ())
}

fn read_counter(db: &ErDatabase, entity: &str) -> Result<Option<i64>, DbError> {
    let sql = format!(
        "SELECT \"next_id\" FROM {} WHERE \"entity\" = ?",
        quote_identifier(COUNTER_TABLE)
    );
    let result = db.query(&sql, &[Value::from(entity)])?;
    Ok(result.scalar().and_then(Value::as_i64))
}

/// Insert the counter row for `entity` starting after its largest key, unless
/// another writer already did.
fn seed_counter(db: &ErDatabase, entity: &str, table: &str) -> Result<(), DbError> {
    let counters = quote_identifier(COUNTER_TABLE);
    let sql = format!(
        "INSERT INTO {counters} (\"entity\", \"next_id\") \
         SELECT ?, (SELECT COALESCE(MAX({id}), 0) + 1 FROM {table}) \
         WHERE NOT EXISTS (SELECT 1 FROM {counters} WHERE \"entity\" = ?)",
        id = quote_identifier(FIELD_ID),
        table = quote_identifier(table),
    );
    match db.execute(&sql, &[Value::from(entity), Value::from(entity)]) {
        Ok(_) => Ok(()),
        Err(e) => {
            // Lost the primary key to a concurrent seed.
            if read_counter(db, entity)?.is_some() {
                debug!(entity, error = %e, "Counter seeded concurrently");
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}

fn autocounter_table(db: &ErDatabase, entity: &str) -> Result<String, IntegrityError> {
    db.metadata()
        .entity(entity)
        .filter(|e| e.autocounter)
        .and_then(|e| db.metadata().relation(e.primary_relation()))
        .map(|r| r.sql_name.clone())
        .ok_or_else(|| IntegrityError::NotAutocounter {
            entity: entity.to_string(),
        })
}

/// Reserve `count` consecutive keys for `entity` and return the first.
///
/// Retries without bound while other writers advance the counter; each lost
/// race is logged. `count` must be positive and the range must fit in `i64`.
#[instrument(skip(db))]
pub fn allocate_ids(db: &ErDatabase, entity: &str, count: u64) -> Result<i64, ErdbError> {
    let invalid = || IntegrityError::InvalidIdCount {
        entity: entity.to_string(),
        count,
    };
    let width = i64::try_from(count).ok().filter(|&n| n > 0).ok_or_else(invalid)?;
    let table = autocounter_table(db, entity)?;
    ensure_counter_table(db)?;
    let key = Value::from(entity);
    let mut conflicts = 0u64;
    loop {
        let Some(current) = read_counter(db, entity)? else {
            seed_counter(db, entity, &table)?;
            continue;
        };
        let next = current.checked_add(width).ok_or_else(invalid)?;
        if compare_and_swap(
            db,
            COUNTER_TABLE,
            "entity",
            &key,
            "next_id",
            &Value::Int(current),
            &Value::Int(next),
        )? {
            debug!(first = current, count, conflicts, "Allocated ids");
            return Ok(current);
        }
        conflicts += 1;
        warn!(entity, conflicts, "Id counter changed concurrently, retrying");
    }
}

/// Rebuild the counter table from the largest key of every autocounter entity.
#[instrument(skip_all)]
pub fn refresh_id_table(db: &ErDatabase) -> Result<Vec<(String, i64)>, ErdbError> {
    ensure_counter_table(db)?;
    db.execute(&format!("DELETE FROM {}", quote_identifier(COUNTER_TABLE)), &[])?;

    let entities: Vec<String> = db
        .metadata()
        .autocounter_entities()
        .map(|e| e.name.clone())
        .collect();
    let mut counters = Vec::with_capacity(entities.len());
    for entity in entities {
        let table = autocounter_table(db, &entity)?;
        seed_counter(db, &entity, &table)?;
        let next = read_counter(db, &entity)?.unwrap_or(1);
        counters.push((entity, next));
    }
    info!(entities = counters.len(), "Refreshed id counters");
    Ok(counters)
}
