//! Duplicate-avoiding inserts keyed by an alternate field.
//!
//! Loaders often know an instance by a natural key (a drug name, an external
//! accession) and need its surrogate id, inserting the instance when it is new.
//! [`IdHelper`] captures that as two calls. Two policies implement it:
//!
//! | Policy | Lookup | Safe with other writers |
//! |--------|--------|-------------------------|
//! | [`ExclusiveIdHelper`] | in-process cache, loaded once | no |
//! | [`SharedIdHelper`] | one query per call | yes |

use std::collections::BTreeMap;

use tracing::debug;

use crate::database::ErDatabase;
use crate::db::escape::quote_identifier;
use crate::db::Value;
use crate::error::{ErdbError, IntegrityError};
use crate::record::Record;
use crate::schema::{FieldType, FIELD_ID};

pub trait IdHelper {
    /// Key of the instance whose alternate field equals `alt_key`.
    fn check(&mut self, alt_key: &Value) -> Result<Option<Value>, ErdbError>;

    /// Insert a new instance and return its key.
    fn insert_new(&mut self, fields: &Record) -> Result<Value, ErdbError>;
}

/// Where the alternate field lives and how its values are encoded.
struct AltKey<'a> {
    db: &'a ErDatabase,
    entity: String,
    field: String,
    table: String,
    column: String,
}

impl<'a> AltKey<'a> {
    fn new(db: &'a ErDatabase, entity: &str, field: &str) -> Result<Self, ErdbError> {
        let meta = db.metadata();
        let unknown = || IntegrityError::UnknownField {
            object: entity.to_string(),
            field: field.to_string(),
        };
        let field_meta = meta.entity(entity).and_then(|e| e.field(field)).ok_or_else(unknown)?;
        let table = meta
            .relation(&field_meta.relation)
            .map(|r| r.sql_name.clone())
            .ok_or_else(unknown)?;
        Ok(Self {
            db,
            entity: entity.to_string(),
            field: field.to_string(),
            table,
            column: field_meta.column.clone(),
        })
    }

    fn encode(&self, value: &Value) -> Result<Value, ErdbError> {
        let meta = self.db.metadata();
        match meta.field(&self.entity, &self.field) {
            Some(field) => Ok(meta.field_type(field)?.encode(value)?),
            None => Ok(value.clone()),
        }
    }

    fn decode_id(&self, stored: &Value) -> Result<Value, ErdbError> {
        let meta = self.db.metadata();
        match meta.field(&self.entity, FIELD_ID) {
            Some(id) => Ok(meta.field_type(id)?.decode(stored)?),
            None => Ok(stored.clone()),
        }
    }

    fn select_sql(&self, filtered: bool) -> String {
        let mut sql = format!(
            "SELECT {}, {} FROM {}",
            quote_identifier(&self.column),
            quote_identifier(FIELD_ID),
            quote_identifier(&self.table)
        );
        if filtered {
            sql.push_str(&format!(" WHERE {} = ?", quote_identifier(&self.column)));
        }
        sql
    }
}

/// Looks up alternate keys in a cache filled from the database on first use.
///
/// Only correct while this helper is the sole writer of the entity.
pub struct ExclusiveIdHelper<'a> {
    key: AltKey<'a>,
    cache: Option<BTreeMap<String, Value>>,
}

impl<'a> ExclusiveIdHelper<'a> {
    pub fn new(db: &'a ErDatabase, entity: &str, field: &str) -> Result<Self, ErdbError> {
        Ok(Self {
            key: AltKey::new(db, entity, field)?,
            cache: None,
        })
    }

    fn cache(&mut self) -> Result<&mut BTreeMap<String, Value>, ErdbError> {
        if self.cache.is_none() {
            let rows = self.key.db.query(&self.key.select_sql(false), &[])?.rows;
            let mut cache = BTreeMap::new();
            for row in rows {
                if let [alt, id] = row.as_slice() {
                    cache.insert(alt.to_string(), self.key.decode_id(id)?);
                }
            }
            debug!(entity = %self.key.entity, entries = cache.len(), "Loaded id cache");
            self.cache = Some(cache);
        }
        Ok(self.cache.get_or_insert_with(BTreeMap::new))
    }
}

impl IdHelper for ExclusiveIdHelper<'_> {
    fn check(&mut self, alt_key: &Value) -> Result<Option<Value>, ErdbError> {
        let encoded = self.key.encode(alt_key)?.to_string();
        Ok(self.cache()?.get(&encoded).cloned())
    }

    fn insert_new(&mut self, fields: &Record) -> Result<Value, ErdbError> {
        let id = self.key.db.insert_object(&self.key.entity, fields)?;
        let encoded = fields
            .values(&self.key.field)
            .iter()
            .map(|v| self.key.encode(v).map(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        let cache = self.cache()?;
        for alt in encoded {
            cache.insert(alt, id.clone());
        }
        Ok(id)
    }
}

/// Looks up alternate keys with a query on every call.
pub struct SharedIdHelper<'a> {
    key: AltKey<'a>,
}

impl<'a> SharedIdHelper<'a> {
    pub fn new(db: &'a ErDatabase, entity: &str, field: &str) -> Result<Self, ErdbError> {
        Ok(Self {
            key: AltKey::new(db, entity, field)?,
        })
    }
}

impl IdHelper for SharedIdHelper<'_> {
    fn check(&mut self, alt_key: &Value) -> Result<Option<Value>, ErdbError> {
        let encoded = self.key.encode(alt_key)?;
        let result = self.key.db.query(&self.key.select_sql(true), &[encoded])?;
        match result.rows.first().and_then(|row| row.get(1)) {
            Some(id) => Ok(Some(self.key.decode_id(id)?)),
            None => Ok(None),
        }
    }

    fn insert_new(&mut self, fields: &Record) -> Result<Value, ErdbError> {
        self.key.db.insert_object(&self.key.entity, fields)
    }
}
