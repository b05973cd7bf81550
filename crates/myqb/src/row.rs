//! Fetched rows and result shapes.

use crate::value::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Shape of the result returned by select-style terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Materializer {
    /// `Vec<Row>`
    #[default]
    Rows,
    /// A JSON array of objects
    Objects,
    /// A JSON-encoded string
    Json,
}

/// One result row: ordered columns plus, with nest-join, per-table sub-rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
    nested: Vec<(String, Row)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column (a later duplicate name overwrites the earlier value).
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.columns.push((name, value)),
        }
    }

    /// Set a column of the nested row for `table`.
    pub fn push_nested(&mut self, table: &str, name: impl Into<String>, value: Value) {
        match self.nested.iter_mut().find(|(t, _)| t == table) {
            Some((_, row)) => row.push(name, value),
            None => {
                let mut row = Row::new();
                row.push(name, value);
                self.nested.push((table.to_string(), row));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Sub-row of a joined table (nest-join results).
    pub fn nested(&self, table: &str) -> Option<&Row> {
        self.nested.iter().find(|(t, _)| t == table).map(|(_, r)| r)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn first_value(&self) -> Option<&Value> {
        self.columns.first().map(|(_, v)| v)
    }

    pub fn last_value(&self) -> Option<&Value> {
        self.columns.last().map(|(_, v)| v)
    }

    /// Number of top-level columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.nested.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len() + self.nested.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        for (table, row) in &self.nested {
            map.serialize_entry(table, row)?;
        }
        map.end()
    }
}

/// Value stored under a map key: the whole row, or just the remaining
/// column when the row has at most two.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapped {
    Row(Row),
    Value(Value),
}

impl Serialize for Mapped {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Mapped::Row(row) => row.serialize(serializer),
            Mapped::Value(value) => value.serialize(serializer),
        }
    }
}

/// Rows keyed by the text of one column, in first-seen key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyedRows {
    entries: Vec<(String, Mapped)>,
}

impl KeyedRows {
    /// Key `rows` by `key`; a later row with the same key replaces the earlier one.
    pub fn from_rows(rows: Vec<Row>, key: &str) -> Self {
        let mut keyed = KeyedRows::default();
        for row in rows {
            let k = row.get(key).map(Value::to_string).unwrap_or_default();
            let mapped = if row.len() > 2 {
                Mapped::Row(row)
            } else {
                match row.last_value() {
                    Some(v) => Mapped::Value(v.clone()),
                    None => Mapped::Value(Value::Null),
                }
            };
            match keyed.entries.iter_mut().find(|(existing, _)| *existing == k) {
                Some((_, slot)) => *slot = mapped,
                None => keyed.entries.push((k, mapped)),
            }
        }
        keyed
    }

    pub fn get(&self, key: &str) -> Option<&Mapped> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, m)| m)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for KeyedRows {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Result of a select-style terminal, shaped by the active [`Materializer`]
/// and map key.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Rows(Vec<Row>),
    Keyed(KeyedRows),
    Objects(serde_json::Value),
    Json(String),
}

impl Fetched {
    /// The rows, when the result is in row form.
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            Fetched::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// Consume into rows; other shapes yield no rows.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Fetched::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    pub fn keyed(&self) -> Option<&KeyedRows> {
        match self {
            Fetched::Keyed(keyed) => Some(keyed),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&str> {
        match self {
            Fetched::Json(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_objects(&self) -> Option<&serde_json::Value> {
        match self {
            Fetched::Objects(v) => Some(v),
            _ => None,
        }
    }
}

/// Result of `raw_query_value`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    None,
    One(Value),
    Many(Vec<Value>),
}
