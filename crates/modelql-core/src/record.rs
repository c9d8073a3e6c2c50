//! Hydrated model records.

use crate::Result;
use crate::error::Error;
use crate::value::{BindType, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Persistence state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirtyState {
    /// Loaded from or written to the database
    Persistent,
    /// Built in memory, never stored
    Transient,
    /// Deleted from the database
    Detached,
}

/// A validation or persistence message attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
    pub field: Option<String>,
    pub kind: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
            kind: "Message".to_string(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }
}

/// One instance of a model: the attribute values keyed by attribute name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    model: String,
    attributes: IndexMap<String, Value>,
    snapshot: Option<IndexMap<String, Value>>,
    messages: Vec<Message>,
    dirty_state: DirtyState,
}

impl Record {
    /// A transient record with no attributes.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            attributes: IndexMap::new(),
            snapshot: None,
            messages: Vec::new(),
            dirty_state: DirtyState::Transient,
        }
    }

    /// Hydrate a persistent record from fetched column values.
    ///
    /// With a column map every key must be a mapped column and is renamed to
    /// its attribute; without one the column names are used as-is. Data types
    /// are only consulted when `cast` is set.
    pub fn hydrate(
        model: impl Into<String>,
        data: impl IntoIterator<Item = (String, Value)>,
        column_map: Option<&IndexMap<String, String>>,
        data_types: Option<&IndexMap<String, BindType>>,
        keep_snapshot: bool,
    ) -> Result<Self> {
        let mut record = Self::new(model);
        for (column, value) in data {
            let attribute = match column_map {
                Some(map) => map.get(&column).cloned().ok_or_else(|| {
                    Error::MetaData(format!(
                        "Column '{}' doesn't make part of the column map",
                        column
                    ))
                })?,
                None => column.clone(),
            };
            let value = match data_types.and_then(|types| types.get(&column)) {
                Some(bind_type) => cast_value(value, *bind_type),
                None => value,
            };
            record.attributes.insert(attribute, value);
        }
        record.dirty_state = DirtyState::Persistent;
        if keep_snapshot {
            record.snapshot = Some(record.attributes.clone());
        }
        Ok(record)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    /// Attribute value, NULL when unset.
    pub fn read_attribute(&self, attribute: &str) -> Value {
        self.attributes.get(attribute).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&mut self, attribute: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(attribute.into(), value.into());
        self
    }

    /// Assign several attributes at once.
    pub fn assign<I, K, V>(&mut self, data: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (k, v) in data {
            self.attributes.insert(k.into(), v.into());
        }
        self
    }

    pub fn attributes(&self) -> &IndexMap<String, Value> {
        &self.attributes
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty_state
    }

    pub fn set_dirty_state(&mut self, state: DirtyState) {
        self.dirty_state = state;
    }

    pub fn is_persistent(&self) -> bool {
        self.dirty_state == DirtyState::Persistent
    }

    pub fn snapshot(&self) -> Option<&IndexMap<String, Value>> {
        self.snapshot.as_ref()
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Remember the current attributes as the last known database state.
    pub fn take_snapshot(&mut self) {
        self.snapshot = Some(self.attributes.clone());
    }

    /// Attributes that differ from the snapshot. Every attribute counts as
    /// changed when no snapshot is kept.
    pub fn changed_fields(&self) -> Vec<String> {
        match &self.snapshot {
            Some(snapshot) => self
                .attributes
                .iter()
                .filter(|(name, value)| snapshot.get(*name) != Some(*value))
                .map(|(name, _)| name.clone())
                .collect(),
            None => self.attributes.keys().cloned().collect(),
        }
    }

    pub fn has_changed(&self, attribute: &str) -> bool {
        self.changed_fields().iter().any(|f| f == attribute)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn append_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    /// JSON object of the attributes.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

fn cast_value(value: Value, bind_type: BindType) -> Value {
    match (bind_type, &value) {
        (BindType::Int, Value::Text(_) | Value::Decimal(_)) => {
            value.as_i64().map_or(value, Value::Int)
        }
        (BindType::Decimal, Value::Text(_) | Value::Decimal(_)) => {
            value.as_f64().map_or(value, Value::Double)
        }
        (BindType::Bool, Value::Int(i)) => Value::Bool(*i != 0),
        (BindType::Bool, Value::Text(s)) => Value::Bool(s != "0" && !s.is_empty()),
        _ => value,
    }
}
