//! The database handle.
//!
//! [`ErDatabase`] pairs one connection with the compiled [`Metadata`] it was
//! opened against. It runs statements with bounded retry, compiles and runs
//! queries, and writes objects. Schema synchronization, key allocation and
//! cascading delete live in their own modules and take the handle by reference.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::db::escape::quote_identifier;
use crate::db::{with_retry, DatabaseConfig, DbError, QueryResult, SqlConnection, Value, DEFAULT_MAX_RETRIES};
use crate::error::{ErdbError, IntegrityError};
use crate::keys::allocate_ids;
use crate::query::{ColumnMap, CompiledQuery, QueryCompiler, QueryError};
use crate::record::Record;
use crate::schema::compilers::SqlCompiler;
use crate::schema::{
    FieldMeta, FieldType, Metadata, RelationMeta, TypeRegistry, FIELD_FROM_LINK, FIELD_ID,
    FIELD_TO_LINK,
};

/// Reserved table holding the serialized metadata cache.
pub const METADATA_TABLE: &str = "_metadata";

const METADATA_KEY: &str = "schema";

/// A connection bound to a compiled schema.
pub struct ErDatabase {
    conn: Box<dyn SqlConnection>,
    meta: Arc<Metadata>,
    max_retries: u32,
}

impl ErDatabase {
    pub fn new(conn: Box<dyn SqlConnection>, meta: Arc<Metadata>) -> Self {
        Self {
            conn,
            meta,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Connect using `config`.
    pub fn open(config: &DatabaseConfig, meta: Arc<Metadata>) -> Result<Self, ErdbError> {
        let conn = config.connect()?;
        info!(backend = conn.backend_name(), "Opened database");
        Ok(Self::new(conn, meta))
    }

    /// Connect using `config` and the metadata cached in the database itself.
    ///
    /// Returns `None` when no cache has been stored.
    pub fn open_cached(
        config: &DatabaseConfig,
        registry: Arc<TypeRegistry>,
    ) -> Result<Option<Self>, ErdbError> {
        let conn = config.connect()?;
        match Metadata::load_cached(conn.as_ref(), registry)? {
            Some(meta) => Ok(Some(Self::new(conn, Arc::new(meta)))),
            None => Ok(None),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    pub fn shared_metadata(&self) -> Arc<Metadata> {
        Arc::clone(&self.meta)
    }

    /// The raw connection. Statements sent through it are not retried.
    pub fn connection(&self) -> &dyn SqlConnection {
        self.conn.as_ref()
    }

    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        with_retry(self.conn.as_ref(), self.max_retries, |conn| conn.execute(sql, params))
    }

    pub fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
        with_retry(self.conn.as_ref(), self.max_retries, |conn| conn.query(sql, params))
    }

    pub fn begin(&self) -> Result<(), DbError> {
        self.conn.begin()
    }

    pub fn commit(&self) -> Result<(), DbError> {
        self.conn.commit()
    }

    pub fn rollback(&self) -> Result<(), DbError> {
        self.conn.rollback()
    }

    pub fn compile_query(
        &self,
        objects: &str,
        filter: &str,
        fields: Option<&[&str]>,
    ) -> Result<CompiledQuery, ErdbError> {
        Ok(QueryCompiler::new(&self.meta).compile(objects, filter, fields)?)
    }

    /// Parameters in the form the compiled query binds them: a parameter
    /// compared with a field is encoded by that field's type.
    pub fn encode_params(&self, query: &CompiledQuery, params: &[Value]) -> Result<Vec<Value>, ErdbError> {
        params
            .iter()
            .enumerate()
            .map(|(i, value)| match query.param_types.get(i).and_then(Option::as_deref) {
                Some(type_name) => Ok(self.meta.registry().resolve(type_name)?.encode(value)?),
                None => Ok(value.clone()),
            })
            .collect()
    }

    /// Run a query and return one record per row, keyed by `Object(field)`.
    ///
    /// Values are decoded through the type registry. Secondary fields are
    /// fetched by id with one statement per distinct (relation, id).
    #[instrument(skip(self, params, fields))]
    pub fn get_all(
        &self,
        objects: &str,
        filter: &str,
        params: &[Value],
        fields: Option<&[&str]>,
    ) -> Result<Vec<Record>, ErdbError> {
        let query = self.compile_query(objects, filter, fields)?;
        let params = self.encode_params(&query, params)?;
        let result = self.query(&query.select_sql(), &params)?;
        debug!(rows = result.rows.len(), "Fetched rows");

        let mut secondary_cache: BTreeMap<(String, String, String), Vec<Value>> = BTreeMap::new();
        let mut records = Vec::with_capacity(result.rows.len());
        for row in &result.rows {
            let mut record = Record::new();
            for (name, map) in &query.columns {
                match map {
                    ColumnMap::Primary { index, type_name } => {
                        let stored = row.get(*index).cloned().unwrap_or_default();
                        let value = self.meta.registry().resolve(type_name)?.decode(&stored)?;
                        record.push(name, value);
                    }
                    ColumnMap::Secondary {
                        id_index,
                        relation_sql,
                        column,
                        type_name,
                        ..
                    } => {
                        let id = row.get(*id_index).cloned().unwrap_or_default();
                        let key = (relation_sql.clone(), column.clone(), id.to_string());
                        if !secondary_cache.contains_key(&key) {
                            let stored = self.secondary_values(relation_sql, column, &id)?;
                            let ty = self.meta.registry().resolve(type_name)?;
                            let decoded = stored
                                .iter()
                                .map(|v| ty.decode(v))
                                .collect::<Result<Vec<_>, _>>()?;
                            secondary_cache.insert(key.clone(), decoded);
                        }
                        record.set(name, secondary_cache.get(&key).cloned().unwrap_or_default());
                    }
                }
            }
            records.push(record);
        }
        Ok(records)
    }

    fn secondary_values(&self, table: &str, column: &str, id: &Value) -> Result<Vec<Value>, DbError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            quote_identifier(column),
            quote_identifier(table),
            quote_identifier(FIELD_ID)
        );
        Ok(self.query(&sql, std::slice::from_ref(id))?.first_column())
    }

    /// Number of rows a query would return.
    pub fn get_count(&self, objects: &str, filter: &str, params: &[Value]) -> Result<u64, ErdbError> {
        let query = self.compile_query(objects, filter, None)?;
        let params = self.encode_params(&query, params)?;
        let result = self.query(&query.count_sql(), &params)?;
        let count = result.scalar().and_then(Value::as_i64).unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    /// Whether an instance of `entity` with key `id` exists.
    pub fn exists(&self, entity: &str, id: &Value) -> Result<bool, ErdbError> {
        let relation = self.entity_relation(entity)?;
        let key = self.encode_field(relation.field(FIELD_ID), id)?;
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ? LIMIT 1",
            quote_identifier(&relation.sql_name),
            quote_identifier(FIELD_ID)
        );
        Ok(!self.query(&sql, &[key])?.rows.is_empty())
    }

    fn entity_relation(&self, entity: &str) -> Result<&RelationMeta, ErdbError> {
        self.meta
            .entity(entity)
            .and_then(|e| self.meta.relation(e.primary_relation()))
            .ok_or_else(|| {
                QueryError::UnknownObject {
                    name: entity.to_string(),
                }
                .into()
            })
    }

    fn encode_field(&self, field: Option<&FieldMeta>, value: &Value) -> Result<Value, ErdbError> {
        match field {
            Some(field) => Ok(self.meta.field_type(field)?.encode(value)?),
            None => Ok(value.clone()),
        }
    }

    /// Value stored for an omitted field: the declared default, or NULL for
    /// nullable fields. Any other field is required.
    fn omitted_value(&self, object: &str, field: &FieldMeta) -> Result<Value, ErdbError> {
        let ty = self.meta.field_type(field)?;
        if let Some(default) = &field.default {
            return Ok(ty.encode(default)?);
        }
        if field.nullable || ty.nullable() {
            return Ok(Value::Null);
        }
        Err(IntegrityError::MissingField {
            object: object.to_string(),
            field: field.name.clone(),
        }
        .into())
    }

    fn single_value<'r>(
        object: &str,
        field: &FieldMeta,
        values: &'r Record,
    ) -> Result<Option<&'r Value>, IntegrityError> {
        match values.values(&field.name) {
            [] => Ok(None),
            [value] => Ok(Some(value)),
            many => Err(IntegrityError::MismatchedValues {
                object: object.to_string(),
                field: field.name.clone(),
                expected: 1,
                found: many.len(),
            }),
        }
    }

    fn check_names(&self, object: &str, values: &Record) -> Result<(), IntegrityError> {
        for name in values.names() {
            if self.meta.field(object, name).is_none() {
                return Err(IntegrityError::UnknownField {
                    object: object.to_string(),
                    field: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn insert_row(&self, relation: &RelationMeta, row: &[Value]) -> Result<(), ErdbError> {
        self.execute(&SqlCompiler::compile_insert(relation), row)?;
        Ok(())
    }

    /// Insert an entity instance or a relationship row.
    ///
    /// For entities the key is returned; autocounter entities get a freshly
    /// allocated key when `id` is omitted. Relationships (and their converse
    /// names) return `Value::Null`. An embedded relationship is written by
    /// updating the target entity's row.
    #[instrument(skip(self, values))]
    pub fn insert_object(&self, object: &str, values: &Record) -> Result<Value, ErdbError> {
        self.check_names(object, values)?;
        if let Some(entity) = self.meta.entity(object) {
            self.insert_entity(object, entity.autocounter, values)
        } else if let Some(rel) = self.meta.object(object).and_then(|o| self.meta.relationship(&o.base)) {
            if rel.embedded {
                self.insert_embedded(object, &rel.to, values)?;
            } else {
                let relation = self.meta.relation(&rel.relation).ok_or_else(|| {
                    QueryError::UnknownObject {
                        name: rel.relation.clone(),
                    }
                })?;
                let mut row = Vec::with_capacity(relation.fields.len());
                for column in &relation.fields {
                    let field = self
                        .meta
                        .fields_of(object)
                        .iter()
                        .find(|f| f.column == column.column)
                        .unwrap_or(column);
                    row.push(self.field_value(object, field, values, true)?);
                }
                self.insert_row(relation, &row)?;
            }
            Ok(Value::Null)
        } else {
            Err(QueryError::UnknownObject {
                name: object.to_string(),
            }
            .into())
        }
    }

    /// Encoded value of `field`, falling back to [`Self::omitted_value`].
    /// Keys and links are required when `required_links` is set.
    fn field_value(
        &self,
        object: &str,
        field: &FieldMeta,
        values: &Record,
        required_links: bool,
    ) -> Result<Value, ErdbError> {
        match Self::single_value(object, field, values)? {
            Some(value) => self.encode_field(Some(field), value),
            None if required_links
                && [FIELD_ID, FIELD_FROM_LINK, FIELD_TO_LINK].contains(&field.name.as_str()) =>
            {
                Err(IntegrityError::MissingField {
                    object: object.to_string(),
                    field: field.name.clone(),
                }
                .into())
            }
            None => self.omitted_value(object, field),
        }
    }

    fn insert_entity(&self, name: &str, autocounter: bool, values: &Record) -> Result<Value, ErdbError> {
        let entity = self
            .meta
            .entity(name)
            .ok_or_else(|| QueryError::UnknownObject { name: name.to_string() })?;
        let id_field = &entity.fields[0];
        let id = match Self::single_value(name, id_field, values)? {
            Some(id) => self.encode_field(Some(id_field), id)?,
            None if autocounter => Value::Int(allocate_ids(self, name, 1)?),
            None => {
                return Err(IntegrityError::MissingField {
                    object: name.to_string(),
                    field: FIELD_ID.to_string(),
                }
                .into())
            }
        };

        for relation_name in &entity.relations {
            let Some(relation) = self.meta.relation(relation_name) else {
                continue;
            };
            if relation_name == entity.primary_relation() {
                let mut row = vec![id.clone()];
                for field in relation.fields.iter().skip(1) {
                    row.push(self.field_value(name, field, values, false)?);
                }
                self.insert_row(relation, &row)?;
                continue;
            }

            let data_fields: Vec<&FieldMeta> = relation.fields.iter().skip(1).collect();
            let count = data_fields
                .iter()
                .map(|f| values.values(&f.name).len())
                .max()
                .unwrap_or(0);
            for field in &data_fields {
                let found = values.values(&field.name).len();
                if found != count {
                    return Err(IntegrityError::MismatchedValues {
                        object: name.to_string(),
                        field: field.name.clone(),
                        expected: count,
                        found,
                    }
                    .into());
                }
            }
            for i in 0..count {
                let mut row = vec![id.clone()];
                for field in &data_fields {
                    let value = &values.values(&field.name)[i];
                    row.push(self.encode_field(Some(field), value)?);
                }
                self.insert_row(relation, &row)?;
            }
        }
        debug!(entity = name, id = %id, "Inserted entity");
        Ok(id)
    }

    fn insert_embedded(&self, object: &str, target: &str, values: &Record) -> Result<(), ErdbError> {
        let relation = self.entity_relation(target)?;
        let mut key = None;
        let mut sets = Vec::new();
        let mut params = Vec::new();
        for field in self.meta.fields_of(object) {
            let value = self.field_value(object, field, values, true)?;
            if field.column == FIELD_ID {
                key = Some(value);
            } else {
                sets.push(format!("{} = ?", quote_identifier(&field.column)));
                params.push(value);
            }
        }
        let key = key.unwrap_or_default();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote_identifier(&relation.sql_name),
            sets.join(", "),
            quote_identifier(FIELD_ID)
        );
        params.push(key.clone());
        if self.execute(&sql, &params)? == 0 {
            return Err(IntegrityError::NotFound {
                entity: target.to_string(),
                id: key.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Set one primary-relation field of an entity instance.
    ///
    /// Returns `false` when the instance does not exist and `optional` is set;
    /// a missing instance is an error otherwise.
    #[instrument(skip(self, id, value))]
    pub fn update_field(
        &self,
        entity: &str,
        id: &Value,
        field: &str,
        value: &Value,
        optional: bool,
    ) -> Result<bool, ErdbError> {
        let relation = self.entity_relation(entity)?;
        let meta = self
            .meta
            .entity(entity)
            .and_then(|e| e.field(field))
            .ok_or_else(|| IntegrityError::UnknownField {
                object: entity.to_string(),
                field: field.to_string(),
            })?;
        if meta.name == FIELD_ID || meta.is_secondary() {
            return Err(IntegrityError::NotUpdatable {
                object: entity.to_string(),
                field: field.to_string(),
            }
            .into());
        }
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE {} = ?",
            quote_identifier(&relation.sql_name),
            quote_identifier(&meta.column),
            quote_identifier(FIELD_ID)
        );
        let encoded = self.encode_field(Some(meta), value)?;
        let key = self.encode_field(relation.field(FIELD_ID), id)?;
        if self.execute(&sql, &[encoded, key])? > 0 {
            return Ok(true);
        }
        if optional {
            Ok(false)
        } else {
            Err(IntegrityError::NotFound {
                entity: entity.to_string(),
                id: id.to_string(),
            }
            .into())
        }
    }

    /// Store the compiled metadata in the database for [`Self::open_cached`].
    pub fn store_metadata_cache(&self) -> Result<(), ErdbError> {
        self.meta.store_cache(self.conn.as_ref())
    }
}

impl Metadata {
    /// Write this metadata into the reserved cache table, replacing any
    /// previous copy.
    pub fn store_cache(&self, conn: &dyn SqlConnection) -> Result<(), ErdbError> {
        let table = quote_identifier(METADATA_TABLE);
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (\"name\" VARCHAR(250) NOT NULL, \"data\" TEXT NOT NULL)",
                table
            ),
            &[],
        )?;
        conn.execute(
            &format!("DELETE FROM {} WHERE \"name\" = ?", table),
            &[Value::from(METADATA_KEY)],
        )?;
        conn.execute(
            &format!("INSERT INTO {} (\"name\", \"data\") VALUES (?, ?)", table),
            &[Value::from(METADATA_KEY), Value::from(self.to_json()?)],
        )?;
        debug!("Stored metadata cache");
        Ok(())
    }

    /// Read metadata previously stored with [`Metadata::store_cache`].
    pub fn load_cached(
        conn: &dyn SqlConnection,
        registry: Arc<TypeRegistry>,
    ) -> Result<Option<Self>, ErdbError> {
        if !conn.table_exists(METADATA_TABLE)? {
            return Ok(None);
        }
        let result = conn.query(
            &format!(
                "SELECT \"data\" FROM {} WHERE \"name\" = ?",
                quote_identifier(METADATA_TABLE)
            ),
            &[Value::from(METADATA_KEY)],
        )?;
        match result.scalar().and_then(Value::as_str) {
            Some(json) => Ok(Some(Metadata::from_json(json, registry)?)),
            None => Ok(None),
        }
    }
}
