//! Field type registry.
//!
//! Every field in a schema names a type from the registry. A type knows how to
//! encode application values into storable SQL values and back, which SQL column
//! type holds them, whether and how they can be indexed, how `sort(1)` should
//! order them in a load file and roughly how many bytes a value occupies.
//!
//! # Built-in Types
//!
//! | Name | SQL type | Index | Sort |
//! |------|----------|-------|------|
//! | `int` | `INTEGER` | as-is | numeric |
//! | `counter`, `bigint` | `BIGINT` | as-is | numeric |
//! | `float` | `DOUBLE PRECISION` | as-is | general |
//! | `boolean` | `SMALLINT` | as-is | numeric |
//! | `char` | `CHAR(1)` | as-is | alpha |
//! | `string` | `VARCHAR(250)` | as-is | alpha |
//! | `text` | `TEXT` | prefix `(250)` | alpha |
//! | `date` | `BIGINT` (epoch seconds) | as-is | numeric |
//! | `hash-string` | `TEXT` | prefix `(64)` | alpha |
//! | `image` | `TEXT` (hex) | none | alpha |
//!
//! Additional types are registered with [`TypeRegistry::register`] by wrapping an
//! implementation of [`FieldType`] in [`CustomType`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use enum_dispatch::enum_dispatch;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::db::Value;

/// Errors raised while resolving types or converting values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeError {
    #[error("Unknown field type '{name}'")]
    UnknownType { name: String },

    #[error("Cannot encode {found} value '{value}' as {type_name}")]
    Encode {
        type_name: String,
        found: &'static str,
        value: String,
    },

    #[error("Cannot decode stored value '{value}' as {type_name}")]
    Decode { type_name: String, value: String },
}

/// Key modifier used in `sort -k` specifications for load files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Plain byte-wise ordering.
    Alpha,
    /// Integer ordering (`n`).
    Numeric,
    /// Floating point ordering (`g`).
    General,
}

impl SortKey {
    pub fn modifier(&self) -> &'static str {
        match self {
            SortKey::Alpha => "",
            SortKey::Numeric => "n",
            SortKey::General => "g",
        }
    }
}

/// Behavior shared by every field type.
#[enum_dispatch]
pub trait FieldType {
    /// Registry name (`string`, `int`, ...).
    fn name(&self) -> &str;

    /// Column type used in `CREATE TABLE`.
    fn sql_type(&self) -> String;

    /// Whether columns of this type accept NULL regardless of the field definition.
    fn nullable(&self) -> bool {
        false
    }

    /// `None` when the type cannot be indexed, `Some("")` when it can be indexed
    /// as-is and `Some("(n)")` when only an `n`-character prefix can be indexed.
    fn index_mod(&self) -> Option<&str>;

    fn sort_key(&self) -> SortKey;

    /// Value used when an insert omits a field that has no declared default.
    fn default_value(&self) -> Value;

    /// Average storage size in bytes, used for row estimates.
    fn average_size(&self) -> usize;

    /// Convert an application value into its stored form.
    fn encode(&self, value: &Value) -> Result<Value, TypeError>;

    /// Convert a stored value back into its application form.
    fn decode(&self, stored: &Value) -> Result<Value, TypeError>;

    /// Interpret one already-encoded field of a tab-delimited load file.
    fn parse_stored(&self, text: &str) -> Result<Value, TypeError> {
        Ok(Value::Str(text.to_string()))
    }

    /// Whether the type holds integers, which autocounter keys require.
    fn is_integer(&self) -> bool {
        false
    }
}

fn encode_error(type_name: &str, value: &Value) -> TypeError {
    TypeError::Encode {
        type_name: type_name.to_string(),
        found: value.type_name(),
        value: value.to_string(),
    }
}

fn decode_error(type_name: &str, value: &Value) -> TypeError {
    TypeError::Decode {
        type_name: type_name.to_string(),
        value: value.to_string(),
    }
}

/// Integer types: `int`, `counter` and `bigint`.
#[derive(Debug, Clone)]
pub struct IntType {
    name: &'static str,
    wide: bool,
}

impl FieldType for IntType {
    fn name(&self) -> &str {
        self.name
    }

    fn sql_type(&self) -> String {
        if self.wide { "BIGINT" } else { "INTEGER" }.to_string()
    }

    fn index_mod(&self) -> Option<&str> {
        Some("")
    }

    fn sort_key(&self) -> SortKey {
        SortKey::Numeric
    }

    fn default_value(&self) -> Value {
        Value::Int(0)
    }

    fn average_size(&self) -> usize {
        if self.wide { 8 } else { 4 }
    }

    fn encode(&self, value: &Value) -> Result<Value, TypeError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Float(f) if f.fract() != 0.0 => Err(encode_error(self.name, value)),
            _ => value
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| encode_error(self.name, value)),
        }
    }

    fn decode(&self, stored: &Value) -> Result<Value, TypeError> {
        match stored {
            Value::Null => Ok(Value::Null),
            _ => stored
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| decode_error(self.name, stored)),
        }
    }

    fn parse_stored(&self, text: &str) -> Result<Value, TypeError> {
        text.trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| decode_error(self.name, &Value::from(text)))
    }

    fn is_integer(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct FloatType;

impl FieldType for FloatType {
    fn name(&self) -> &str {
        "float"
    }

    fn sql_type(&self) -> String {
        "DOUBLE PRECISION".to_string()
    }

    fn index_mod(&self) -> Option<&str> {
        Some("")
    }

    fn sort_key(&self) -> SortKey {
        SortKey::General
    }

    fn default_value(&self) -> Value {
        Value::Float(0.0)
    }

    fn average_size(&self) -> usize {
        8
    }

    fn encode(&self, value: &Value) -> Result<Value, TypeError> {
        match value {
            Value::Null => Ok(Value::Null),
            _ => value
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| encode_error("float", value)),
        }
    }

    fn decode(&self, stored: &Value) -> Result<Value, TypeError> {
        match stored {
            Value::Null => Ok(Value::Null),
            _ => stored
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| decode_error("float", stored)),
        }
    }

    fn parse_stored(&self, text: &str) -> Result<Value, TypeError> {
        text.trim()
            .parse()
            .map(Value::Float)
            .map_err(|_| decode_error("float", &Value::from(text)))
    }
}

/// Booleans are stored as `0`/`1` small integers.
#[derive(Debug, Clone)]
pub struct BoolType;

impl FieldType for BoolType {
    fn name(&self) -> &str {
        "boolean"
    }

    fn sql_type(&self) -> String {
        "SMALLINT".to_string()
    }

    fn index_mod(&self) -> Option<&str> {
        Some("")
    }

    fn sort_key(&self) -> SortKey {
        SortKey::Numeric
    }

    fn default_value(&self) -> Value {
        Value::Bool(false)
    }

    fn average_size(&self) -> usize {
        1
    }

    fn encode(&self, value: &Value) -> Result<Value, TypeError> {
        match value {
            Value::Null => Ok(Value::Null),
            _ => value
                .as_bool()
                .map(|b| Value::Int(i64::from(b)))
                .ok_or_else(|| encode_error("boolean", value)),
        }
    }

    fn decode(&self, stored: &Value) -> Result<Value, TypeError> {
        match stored {
            Value::Null => Ok(Value::Null),
            _ => stored
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| decode_error("boolean", stored)),
        }
    }

    fn parse_stored(&self, text: &str) -> Result<Value, TypeError> {
        self.encode(&Value::from(text))
    }
}

/// Character types: `char`, `string` and `text`.
///
/// Backslash, tab, newline and carriage return are escaped in the stored form so
/// that stored values can be written to tab-delimited load files unchanged.
#[derive(Debug, Clone)]
pub struct StringType {
    name: &'static str,
    sql_type: &'static str,
    index_mod: &'static str,
    average_size: usize,
}

pub(crate) fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

pub(crate) fn unescape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.clone()),
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => Some(value.to_string()),
        Value::Null | Value::Bytes(_) => None,
    }
}

impl FieldType for StringType {
    fn name(&self) -> &str {
        self.name
    }

    fn sql_type(&self) -> String {
        self.sql_type.to_string()
    }

    fn index_mod(&self) -> Option<&str> {
        Some(self.index_mod)
    }

    fn sort_key(&self) -> SortKey {
        SortKey::Alpha
    }

    fn default_value(&self) -> Value {
        Value::Str(String::new())
    }

    fn average_size(&self) -> usize {
        self.average_size
    }

    fn encode(&self, value: &Value) -> Result<Value, TypeError> {
        match value {
            Value::Null => Ok(Value::Null),
            _ => text_of(value)
                .map(|s| Value::Str(escape_text(&s)))
                .ok_or_else(|| encode_error(self.name, value)),
        }
    }

    fn decode(&self, stored: &Value) -> Result<Value, TypeError> {
        match stored {
            Value::Null => Ok(Value::Null),
            _ => text_of(stored)
                .map(|s| Value::Str(unescape_text(&s)))
                .ok_or_else(|| decode_error(self.name, stored)),
        }
    }
}

/// Dates are stored as seconds since the Unix epoch.
#[derive(Debug, Clone)]
pub struct DateType;

impl FieldType for DateType {
    fn name(&self) -> &str {
        "date"
    }

    fn sql_type(&self) -> String {
        "BIGINT".to_string()
    }

    fn index_mod(&self) -> Option<&str> {
        Some("")
    }

    fn sort_key(&self) -> SortKey {
        SortKey::Numeric
    }

    fn default_value(&self) -> Value {
        Value::Int(0)
    }

    fn average_size(&self) -> usize {
        8
    }

    fn encode(&self, value: &Value) -> Result<Value, TypeError> {
        match value {
            Value::Null => Ok(Value::Null),
            _ => value
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| encode_error("date", value)),
        }
    }

    fn decode(&self, stored: &Value) -> Result<Value, TypeError> {
        match stored {
            Value::Null => Ok(Value::Null),
            _ => stored
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| decode_error("date", stored)),
        }
    }

    fn parse_stored(&self, text: &str) -> Result<Value, TypeError> {
        self.decode(&Value::from(text))
    }
}

/// Long strings that must still be unique: the stored form is the hex SHA-256
/// of the value followed by the escaped value, so a 64-character prefix index
/// distinguishes them.
#[derive(Debug, Clone)]
pub struct HashStringType;

const DIGEST_HEX_LEN: usize = 64;

impl FieldType for HashStringType {
    fn name(&self) -> &str {
        "hash-string"
    }

    fn sql_type(&self) -> String {
        "TEXT".to_string()
    }

    fn index_mod(&self) -> Option<&str> {
        Some("(64)")
    }

    fn sort_key(&self) -> SortKey {
        SortKey::Alpha
    }

    fn default_value(&self) -> Value {
        Value::Str(String::new())
    }

    fn average_size(&self) -> usize {
        DIGEST_HEX_LEN + 200
    }

    fn encode(&self, value: &Value) -> Result<Value, TypeError> {
        match value {
            Value::Null => Ok(Value::Null),
            _ => {
                let text = text_of(value).ok_or_else(|| encode_error("hash-string", value))?;
                let digest = hex::encode(Sha256::digest(text.as_bytes()));
                Ok(Value::Str(format!("{}{}", digest, escape_text(&text))))
            }
        }
    }

    fn decode(&self, stored: &Value) -> Result<Value, TypeError> {
        match stored {
            Value::Null => Ok(Value::Null),
            Value::Str(s) if s.len() >= DIGEST_HEX_LEN && s.is_char_boundary(DIGEST_HEX_LEN) => {
                Ok(Value::Str(unescape_text(&s[DIGEST_HEX_LEN..])))
            }
            _ => Err(decode_error("hash-string", stored)),
        }
    }
}

/// Binary data stored as hex text. Not indexable.
#[derive(Debug, Clone)]
pub struct ImageType;

impl FieldType for ImageType {
    fn name(&self) -> &str {
        "image"
    }

    fn sql_type(&self) -> String {
        "TEXT".to_string()
    }

    fn index_mod(&self) -> Option<&str> {
        None
    }

    fn sort_key(&self) -> SortKey {
        SortKey::Alpha
    }

    fn default_value(&self) -> Value {
        Value::Bytes(Vec::new())
    }

    fn average_size(&self) -> usize {
        10_000
    }

    fn encode(&self, value: &Value) -> Result<Value, TypeError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Bytes(b) => Ok(Value::Str(hex::encode(b))),
            Value::Str(s) => Ok(Value::Str(hex::encode(s.as_bytes()))),
            _ => Err(encode_error("image", value)),
        }
    }

    fn decode(&self, stored: &Value) -> Result<Value, TypeError> {
        match stored {
            Value::Null => Ok(Value::Null),
            Value::Bytes(b) => Ok(Value::Bytes(b.clone())),
            Value::Str(s) => hex::decode(s)
                .map(Value::Bytes)
                .map_err(|_| decode_error("image", stored)),
            _ => Err(decode_error("image", stored)),
        }
    }
}

/// A user-supplied type registered at engine start.
#[derive(Clone)]
pub struct CustomType(pub Arc<dyn FieldType + Send + Sync>);

impl fmt::Debug for CustomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CustomType").field(&self.0.name()).finish()
    }
}

impl FieldType for CustomType {
    fn name(&self) -> &str {
        self.0.name()
    }
    fn sql_type(&self) -> String {
        self.0.sql_type()
    }
    fn nullable(&self) -> bool {
        self.0.nullable()
    }
    fn index_mod(&self) -> Option<&str> {
        self.0.index_mod()
    }
    fn sort_key(&self) -> SortKey {
        self.0.sort_key()
    }
    fn default_value(&self) -> Value {
        self.0.default_value()
    }
    fn average_size(&self) -> usize {
        self.0.average_size()
    }
    fn encode(&self, value: &Value) -> Result<Value, TypeError> {
        self.0.encode(value)
    }
    fn decode(&self, stored: &Value) -> Result<Value, TypeError> {
        self.0.decode(stored)
    }
    fn parse_stored(&self, text: &str) -> Result<Value, TypeError> {
        self.0.parse_stored(text)
    }
    fn is_integer(&self) -> bool {
        self.0.is_integer()
    }
}

/// A registered field type.
#[enum_dispatch(FieldType)]
#[derive(Debug, Clone)]
pub enum TypeKind {
    IntType,
    FloatType,
    BoolType,
    StringType,
    DateType,
    HashStringType,
    ImageType,
    CustomType,
}

/// Catalog of field types keyed by name.
///
/// Built once when an engine starts and shared by reference with the metadata
/// compiler, the query compiler and the synchronizer.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: BTreeMap<String, TypeKind>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl TypeRegistry {
    /// A registry with no types at all.
    pub fn empty() -> Self {
        Self {
            types: BTreeMap::new(),
        }
    }

    /// A registry holding the built-in types.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(IntType {
            name: "int",
            wide: false,
        });
        registry.register(IntType {
            name: "counter",
            wide: true,
        });
        registry.register(IntType {
            name: "bigint",
            wide: true,
        });
        registry.register(FloatType);
        registry.register(BoolType);
        registry.register(StringType {
            name: "char",
            sql_type: "CHAR(1)",
            index_mod: "",
            average_size: 1,
        });
        registry.register(StringType {
            name: "string",
            sql_type: "VARCHAR(250)",
            index_mod: "",
            average_size: 40,
        });
        registry.register(StringType {
            name: "text",
            sql_type: "TEXT",
            index_mod: "(250)",
            average_size: 1_000,
        });
        registry.register(DateType);
        registry.register(HashStringType);
        registry.register(ImageType);
        registry
    }

    /// Add or replace a type under its own name.
    pub fn register(&mut self, kind: impl Into<TypeKind>) {
        let kind = kind.into();
        self.types.insert(kind.name().to_string(), kind);
    }

    pub fn get(&self, name: &str) -> Option<&TypeKind> {
        self.types.get(name)
    }

    /// Look up a type, failing on unknown names.
    pub fn resolve(&self, name: &str) -> Result<&TypeKind, TypeError> {
        self.get(name).ok_or_else(|| TypeError::UnknownType {
            name: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn registry() -> TypeRegistry {
        TypeRegistry::standard()
    }

    #[rstest]
    #[case("int", Value::Int(42))]
    #[case("int", Value::Int(-7))]
    #[case("counter", Value::Int(9_000_000_000))]
    #[case("float", Value::Float(3.25))]
    #[case("boolean", Value::Bool(true))]
    #[case("boolean", Value::Bool(false))]
    #[case("char", Value::from("A"))]
    #[case("string", Value::from("Escherichia coli"))]
    #[case("string", Value::from("tab\there\nnew \\ line"))]
    #[case("text", Value::from("a long\r\ndescription"))]
    #[case("date", Value::Int(1_700_000_000))]
    #[case("hash-string", Value::from("MKLVQ\tPEPTIDE"))]
    #[case("image", Value::Bytes(vec![0, 1, 254, 255]))]
    fn test_decode_inverts_encode(
        registry: TypeRegistry,
        #[case] type_name: &str,
        #[case] value: Value,
    ) {
        let ty = registry.resolve(type_name).unwrap();
        let stored = ty.encode(&value).unwrap();
        assert_eq!(ty.decode(&stored).unwrap(), value);
    }

    #[rstest]
    fn test_null_and_defaults_round_trip(registry: TypeRegistry) {
        for name in registry.names() {
            let ty = registry.resolve(name).unwrap();
            assert_eq!(ty.decode(&ty.encode(&Value::Null).unwrap()).unwrap(), Value::Null);
            let default = ty.default_value();
            assert_eq!(
                ty.decode(&ty.encode(&default).unwrap()).unwrap(),
                default,
                "default of {}",
                name
            );
        }
    }

    #[rstest]
    fn test_string_escaping_keeps_load_lines_intact(registry: TypeRegistry) {
        let ty = registry.resolve("string").unwrap();
        let stored = ty.encode(&Value::from("a\tb\nc")).unwrap();
        assert_eq!(stored, Value::from("a\\tb\\nc"));
    }

    #[rstest]
    fn test_text_decodes_postgres_numeric_text(registry: TypeRegistry) {
        let ty = registry.resolve("int").unwrap();
        assert_eq!(ty.decode(&Value::from("17")).unwrap(), Value::Int(17));
        let ty = registry.resolve("boolean").unwrap();
        assert_eq!(ty.decode(&Value::from("1")).unwrap(), Value::Bool(true));
    }

    #[rstest]
    fn test_hash_string_prefix_is_digest(registry: TypeRegistry) {
        let ty = registry.resolve("hash-string").unwrap();
        let stored = ty.encode(&Value::from("abc")).unwrap();
        let text = stored.as_str().unwrap();
        assert_eq!(
            &text[..64],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(&text[64..], "abc");
    }

    #[rstest]
    #[case("int", Some(""), SortKey::Numeric, "INTEGER")]
    #[case("float", Some(""), SortKey::General, "DOUBLE PRECISION")]
    #[case("text", Some("(250)"), SortKey::Alpha, "TEXT")]
    #[case("hash-string", Some("(64)"), SortKey::Alpha, "TEXT")]
    #[case("image", None, SortKey::Alpha, "TEXT")]
    fn test_type_properties(
        registry: TypeRegistry,
        #[case] type_name: &str,
        #[case] index_mod: Option<&str>,
        #[case] sort_key: SortKey,
        #[case] sql_type: &str,
    ) {
        let ty = registry.resolve(type_name).unwrap();
        assert_eq!(ty.index_mod(), index_mod);
        assert_eq!(ty.sort_key(), sort_key);
        assert_eq!(ty.sql_type(), sql_type);
    }

    #[rstest]
    fn test_encode_rejects_wrong_kind(registry: TypeRegistry) {
        let ty = registry.resolve("int").unwrap();
        let err = ty.encode(&Value::from("forty")).unwrap_err();
        assert!(matches!(err, TypeError::Encode { found: "string", .. }));
        assert!(ty.encode(&Value::Float(1.5)).is_err());
    }

    #[rstest]
    fn test_unknown_type(registry: TypeRegistry) {
        assert_eq!(
            registry.resolve("uuid").unwrap_err(),
            TypeError::UnknownType {
                name: "uuid".to_string()
            }
        );
    }

    #[derive(Debug)]
    struct UpperType;

    impl FieldType for UpperType {
        fn name(&self) -> &str {
            "upper"
        }
        fn sql_type(&self) -> String {
            "VARCHAR(32)".to_string()
        }
        fn index_mod(&self) -> Option<&str> {
            Some("")
        }
        fn sort_key(&self) -> SortKey {
            SortKey::Alpha
        }
        fn default_value(&self) -> Value {
            Value::from("")
        }
        fn average_size(&self) -> usize {
            8
        }
        fn encode(&self, value: &Value) -> Result<Value, TypeError> {
            Ok(value
                .as_str()
                .map(|s| Value::from(s.to_uppercase()))
                .unwrap_or(Value::Null))
        }
        fn decode(&self, stored: &Value) -> Result<Value, TypeError> {
            Ok(stored.clone())
        }
    }

    #[rstest]
    fn test_register_custom_type() {
        let mut registry = TypeRegistry::standard();
        registry.register(CustomType(Arc::new(UpperType)));
        let ty = registry.resolve("upper").unwrap();
        assert_eq!(ty.encode(&Value::from("abc")).unwrap(), Value::from("ABC"));
        assert_eq!(ty.sql_type(), "VARCHAR(32)");
    }
}
