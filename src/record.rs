//! Named field values.
//!
//! A [`Record`] maps field names to one or more values. Rows fetched with
//! [`crate::ErDatabase::get_all`] are keyed by `Object(field)`; values handed to
//! [`crate::ErDatabase::insert_object`] are keyed by bare field names. Secondary
//! fields may carry several values, every other field exactly one.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<String, Vec<Value>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Record::push`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.push(name, value);
        self
    }

    /// Append a value for `name`.
    pub fn push(&mut self, name: &str, value: impl Into<Value>) {
        self.values.entry(name.to_string()).or_default().push(value.into());
    }

    /// Replace every value of `name`.
    pub fn set(&mut self, name: &str, values: Vec<Value>) {
        self.values.insert(name.to_string(), values);
    }

    /// First value of `name`.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name).and_then(|v| v.first())
    }

    pub fn values(&self, name: &str) -> &[Value] {
        self.values.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
