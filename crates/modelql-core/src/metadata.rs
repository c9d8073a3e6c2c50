//! Model metadata provider interface and an in-memory implementation.
//!
//! "Attributes" in the metadata sense are the physical columns of a model's
//! table. When a column map is present, model attributes are the mapped
//! names and the reverse map takes an attribute back to its column.

use crate::value::BindType;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Read-only view over model metadata.
pub trait MetaData: Send + Sync {
    /// Whether `attribute` is an attribute of `model` (a mapped name when a
    /// column map exists).
    fn has_attribute(&self, model: &str, attribute: &str) -> bool {
        match self.get_reverse_column_map(model) {
            Some(map) => map.contains_key(attribute),
            None => self.get_attributes(model).iter().any(|a| a == attribute),
        }
    }

    /// Physical columns in declaration order.
    fn get_attributes(&self, model: &str) -> Vec<String>;

    /// Column to attribute map, if the model renames columns.
    fn get_column_map(&self, model: &str) -> Option<IndexMap<String, String>>;

    /// Attribute to column map, if the model renames columns.
    fn get_reverse_column_map(&self, model: &str) -> Option<IndexMap<String, String>> {
        self.get_column_map(model)
            .map(|map| map.into_iter().map(|(column, attribute)| (attribute, column)).collect())
    }

    /// Bind type per physical column.
    fn get_data_types(&self, model: &str) -> IndexMap<String, BindType>;

    fn get_primary_key_attributes(&self, model: &str) -> Vec<String>;

    fn get_non_primary_key_attributes(&self, model: &str) -> Vec<String> {
        let primary = self.get_primary_key_attributes(model);
        self.get_attributes(model)
            .into_iter()
            .filter(|a| !primary.contains(a))
            .collect()
    }

    /// Auto-generated identity column, if any.
    fn get_identity_field(&self, model: &str) -> Option<String>;
}

/// Table description of one model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelDescriptor {
    pub attributes: Vec<String>,
    pub primary_key: Vec<String>,
    pub data_types: IndexMap<String, BindType>,
    pub identity_field: Option<String>,
    pub column_map: Option<IndexMap<String, String>>,
}

impl ModelDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column with its bind type.
    pub fn column(mut self, name: impl Into<String>, bind_type: BindType) -> Self {
        let name = name.into();
        self.data_types.insert(name.clone(), bind_type);
        self.attributes.push(name);
        self
    }

    /// Add several text columns.
    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self = self.column(name, BindType::Str);
        }
        self
    }

    pub fn primary_key<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn identity(mut self, name: impl Into<String>) -> Self {
        self.identity_field = Some(name.into());
        self
    }

    /// Rename a physical column to a model attribute.
    pub fn rename(mut self, column: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.column_map
            .get_or_insert_with(IndexMap::new)
            .insert(column.into(), attribute.into());
        self
    }
}

/// Metadata kept in memory, registered up front.
///
/// Lookups are case-insensitive on the model name.
#[derive(Debug, Default)]
pub struct MemoryMetaData {
    models: RwLock<HashMap<String, Arc<ModelDescriptor>>>,
}

impl MemoryMetaData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, model: &str, descriptor: ModelDescriptor) {
        let mut models = self.models.write().unwrap_or_else(|e| e.into_inner());
        models.insert(model.to_lowercase(), Arc::new(descriptor));
    }

    /// Builder-style registration.
    pub fn with_model(self, model: &str, descriptor: ModelDescriptor) -> Self {
        self.register(model, descriptor);
        self
    }

    pub fn reset(&self) {
        self.models
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn descriptor(&self, model: &str) -> Option<Arc<ModelDescriptor>> {
        let models = self.models.read().unwrap_or_else(|e| e.into_inner());
        let found = models.get(&model.to_lowercase()).cloned();
        if found.is_none() {
            tracing::trace!(model = %model, "no metadata registered for model");
        }
        found
    }
}

impl MetaData for MemoryMetaData {
    fn get_attributes(&self, model: &str) -> Vec<String> {
        self.descriptor(model)
            .map(|d| d.attributes.clone())
            .unwrap_or_default()
    }

    fn get_column_map(&self, model: &str) -> Option<IndexMap<String, String>> {
        self.descriptor(model).and_then(|d| d.column_map.clone())
    }

    fn get_data_types(&self, model: &str) -> IndexMap<String, BindType> {
        self.descriptor(model)
            .map(|d| d.data_types.clone())
            .unwrap_or_default()
    }

    fn get_primary_key_attributes(&self, model: &str) -> Vec<String> {
        self.descriptor(model)
            .map(|d| d.primary_key.clone())
            .unwrap_or_default()
    }

    fn get_identity_field(&self, model: &str) -> Option<String> {
        self.descriptor(model).and_then(|d| d.identity_field.clone())
    }
}
