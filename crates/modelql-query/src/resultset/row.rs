//! Materialized resultset rows.

use indexmap::IndexMap;
use modelql_core::{Record, Value};

/// One row of a resultset, in the form its hydration mode produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultRow {
    /// A model record (simple resultsets in record mode)
    Record(Record),
    /// A plain row of a select without model columns
    Row(IndexMap<String, Value>),
    /// Ordered attribute map
    Array(IndexMap<String, Value>),
    /// JSON object
    Object(serde_json::Value),
    /// Heterogeneous row of a complex resultset, keyed by column name
    Complex(IndexMap<String, ResultItem>),
}

/// One column of a complex row.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultItem {
    Record(Record),
    Array(IndexMap<String, Value>),
    Object(serde_json::Value),
    Value(Value),
}

impl ResultRow {
    /// Value of an attribute or column.
    ///
    /// For complex rows only scalar columns are returned; use
    /// [`item`](Self::item) for model columns.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self {
            ResultRow::Record(record) => record.get(name).cloned(),
            ResultRow::Row(map) | ResultRow::Array(map) => map.get(name).cloned(),
            ResultRow::Object(object) => object.get(name).map(json_to_value),
            ResultRow::Complex(items) => match items.get(name)? {
                ResultItem::Value(value) => Some(value.clone()),
                _ => None,
            },
        }
    }

    pub fn item(&self, name: &str) -> Option<&ResultItem> {
        match self {
            ResultRow::Complex(items) => items.get(name),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            ResultRow::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            ResultRow::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ResultRow::Record(record) => record.to_json(),
            ResultRow::Row(map) | ResultRow::Array(map) => map_to_json(map),
            ResultRow::Object(object) => object.clone(),
            ResultRow::Complex(items) => serde_json::Value::Object(
                items
                    .iter()
                    .map(|(name, item)| (name.clone(), item.to_json()))
                    .collect(),
            ),
        }
    }
}

impl ResultItem {
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            ResultItem::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ResultItem::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ResultItem::Record(record) => record.to_json(),
            ResultItem::Array(map) => map_to_json(map),
            ResultItem::Object(object) => object.clone(),
            ResultItem::Value(value) => value.to_json(),
        }
    }
}

pub(crate) fn map_to_json(map: &IndexMap<String, Value>) -> serde_json::Value {
    serde_json::Value::Object(
        map.iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect(),
    )
}

fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map_or(Value::Null, Value::Double),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Json(other.clone()),
    }
}
