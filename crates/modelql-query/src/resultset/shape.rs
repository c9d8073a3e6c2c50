//! How fetched rows turn into [`ResultRow`]s.

use super::row::{ResultItem, ResultRow};
use indexmap::IndexMap;
use modelql_core::{BindType, Error, HydrateMode, Record, Result, Row, Value};
use serde::{Deserialize, Serialize};

/// Row layout of a resultset, decided once per SELECT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResultShape {
    /// Exactly one model column: rows are records of `model`
    Simple {
        model: String,
        column_map: Option<IndexMap<String, String>>,
        /// Present when values are cast on hydration
        data_types: Option<IndexMap<String, BindType>>,
        keep_snapshots: bool,
    },
    /// No model columns: rows are plain column maps
    Std,
    /// Several models, or models mixed with scalars
    Complex { columns: Vec<ComplexColumn> },
}

/// One column of a complex resultset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComplexColumn {
    Object {
        name: String,
        model: String,
        /// SQL alias the attributes were selected from
        source: String,
        /// Physical columns, fetched as `_{source}_{column}`
        attributes: Vec<String>,
        column_map: Option<IndexMap<String, String>>,
        data_types: Option<IndexMap<String, BindType>>,
        keep_snapshots: bool,
    },
    Scalar {
        name: String,
        /// Name of the fetched column
        key: String,
    },
}

impl ComplexColumn {
    pub fn name(&self) -> &str {
        match self {
            ComplexColumn::Object { name, .. } | ComplexColumn::Scalar { name, .. } => name,
        }
    }
}

impl ResultShape {
    pub fn is_simple(&self) -> bool {
        !matches!(self, ResultShape::Complex { .. })
    }

    /// Model of a simple resultset.
    pub fn model(&self) -> Option<&str> {
        match self {
            ResultShape::Simple { model, .. } => Some(model),
            _ => None,
        }
    }

    pub(crate) fn hydrate(&self, row: &Row, mode: HydrateMode) -> Result<ResultRow> {
        match self {
            ResultShape::Simple {
                model,
                column_map,
                data_types,
                keep_snapshots,
            } => {
                let data = row.to_map();
                Ok(match mode {
                    HydrateMode::Records => ResultRow::Record(Record::hydrate(
                        model.clone(),
                        data,
                        column_map.as_ref(),
                        data_types.as_ref(),
                        *keep_snapshots,
                    )?),
                    HydrateMode::Arrays => ResultRow::Array(rename(data, column_map.as_ref())?),
                    HydrateMode::Objects => ResultRow::Object(super::row::map_to_json(&rename(
                        data,
                        column_map.as_ref(),
                    )?)),
                })
            }
            ResultShape::Std => {
                let data = row.to_map();
                Ok(match mode {
                    HydrateMode::Records => ResultRow::Row(data),
                    HydrateMode::Arrays => ResultRow::Array(data),
                    HydrateMode::Objects => ResultRow::Object(super::row::map_to_json(&data)),
                })
            }
            ResultShape::Complex { columns } => {
                let mut items = IndexMap::with_capacity(columns.len());
                for column in columns {
                    let item = match column {
                        ComplexColumn::Object {
                            model,
                            source,
                            attributes,
                            column_map,
                            data_types,
                            keep_snapshots,
                            ..
                        } => {
                            let data: IndexMap<String, Value> = attributes
                                .iter()
                                .map(|attribute| {
                                    let key = format!("_{}_{}", source, attribute);
                                    let value = row.get_by_name(&key).cloned().unwrap_or(Value::Null);
                                    (attribute.clone(), value)
                                })
                                .collect();
                            match mode {
                                HydrateMode::Records => ResultItem::Record(Record::hydrate(
                                    model.clone(),
                                    data,
                                    column_map.as_ref(),
                                    data_types.as_ref(),
                                    *keep_snapshots,
                                )?),
                                HydrateMode::Arrays => {
                                    ResultItem::Array(rename(data, column_map.as_ref())?)
                                }
                                HydrateMode::Objects => ResultItem::Object(
                                    super::row::map_to_json(&rename(data, column_map.as_ref())?),
                                ),
                            }
                        }
                        ComplexColumn::Scalar { key, .. } => {
                            ResultItem::Value(row.get_by_name(key).cloned().unwrap_or(Value::Null))
                        }
                    };
                    items.insert(column.name().to_string(), item);
                }
                Ok(ResultRow::Complex(items))
            }
        }
    }
}

/// Rename physical columns to attributes.
fn rename(
    data: IndexMap<String, Value>,
    column_map: Option<&IndexMap<String, String>>,
) -> Result<IndexMap<String, Value>> {
    let Some(map) = column_map else {
        return Ok(data);
    };
    data.into_iter()
        .map(|(column, value)| match map.get(&column) {
            Some(attribute) => Ok((attribute.clone(), value)),
            None => Err(Error::MetaData(format!(
                "Column '{}' is not part of the column map",
                column
            ))),
        })
        .collect()
}
