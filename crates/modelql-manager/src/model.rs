//! Model classes as seen by the manager.

use crate::manager::RelationManager;
use modelql_core::{BindParams, Connection, Result};
use modelql_query::ResultsetFactory;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Key of a model in every manager registry.
///
/// The lowercased fully qualified class name, so `Store\Robots` and
/// `Robots` are different models while `ROBOTS` and `robots` are the same.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModelId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Class name without its namespace.
pub fn short_name(name: &str) -> &str {
    let name = name.rsplit("::").next().unwrap_or(name);
    name.rsplit('\\').next().unwrap_or(name)
}

/// Table name derived from a class name: `RobotsParts` → `robots_parts`.
pub fn default_source(name: &str) -> String {
    static BOUNDARY: OnceLock<Option<Regex>> = OnceLock::new();
    let short = short_name(name);
    match BOUNDARY
        .get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").ok())
        .as_ref()
    {
        Some(boundary) => boundary.replace_all(short, "${1}_${2}").to_lowercase(),
        None => short.to_lowercase(),
    }
}

/// A model class registered with a [`RelationManager`].
///
/// Every hook has a default, so a plain name is a valid model.
pub trait ModelClass: Send + Sync {
    /// Fully qualified class name.
    fn name(&self) -> &str;

    /// Declare relations and bindings. Runs once per manager.
    fn initialize(&self, _manager: &RelationManager) -> Result<()> {
        Ok(())
    }

    /// Factory for the resultsets of simple selects of this model.
    fn resultset_factory(&self) -> Option<Arc<dyn ResultsetFactory>> {
        None
    }

    /// Connection override for reads, e.g. for sharding.
    fn select_read_connection(&self, _binds: &BindParams) -> Option<Arc<dyn Connection>> {
        None
    }

    /// Connection override for writes.
    fn select_write_connection(&self, _binds: &BindParams) -> Option<Arc<dyn Connection>> {
        None
    }
}

/// A model without hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedModel(String);

impl NamedModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl ModelClass for NamedModel {
    fn name(&self) -> &str {
        &self.0
    }
}

type InitializeFn = dyn Fn(&RelationManager) -> Result<()> + Send + Sync;

/// A model whose initialize hook is a closure.
pub struct ClosureModel {
    name: String,
    initialize: Box<InitializeFn>,
    resultset_factory: Option<Arc<dyn ResultsetFactory>>,
}

impl ClosureModel {
    pub fn new<F>(name: impl Into<String>, initialize: F) -> Self
    where
        F: Fn(&RelationManager) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            initialize: Box::new(initialize),
            resultset_factory: None,
        }
    }

    pub fn with_resultset_factory(mut self, factory: Arc<dyn ResultsetFactory>) -> Self {
        self.resultset_factory = Some(factory);
        self
    }
}

impl fmt::Debug for ClosureModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureModel")
            .field("name", &self.name)
            .field("resultset_factory", &self.resultset_factory.is_some())
            .finish()
    }
}

impl ModelClass for ClosureModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, manager: &RelationManager) -> Result<()> {
        (self.initialize)(manager)
    }

    fn resultset_factory(&self) -> Option<Arc<dyn ResultsetFactory>> {
        self.resultset_factory.clone()
    }
}
