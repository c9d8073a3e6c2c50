//! What the compiler and executor need from the models manager.

use crate::Result;
use crate::connection::Connection;
use crate::container::Container;
use crate::fragment::TableSource;
use crate::metadata::MetaData;
use crate::options::OrmOptions;
use crate::params::BindParams;
use crate::record::Record;
use crate::relation::Relation;
use std::sync::Arc;

/// Resolved per-model settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelBinding {
    /// Registered class name
    pub name: String,
    pub source: String,
    pub schema: Option<String>,
    pub read_connection_service: String,
    pub write_connection_service: String,
    pub keep_snapshots: bool,
    pub dynamic_update: bool,
}

impl ModelBinding {
    /// The model's table, unaliased.
    pub fn table(&self) -> TableSource {
        TableSource::new(self.source.clone()).schema(self.schema.clone())
    }
}

/// Model registry and connection resolution as seen by query compilation
/// and execution.
pub trait ModelsManager: Send + Sync {
    fn options(&self) -> OrmOptions;

    fn meta_data(&self) -> Arc<dyn MetaData>;

    fn container(&self) -> Option<Arc<Container>>;

    /// Load (initializing if needed) a model and return its binding.
    fn binding(&self, model: &str) -> Result<ModelBinding>;

    fn relation_by_alias(&self, model: &str, alias: &str) -> Option<Arc<Relation>>;

    fn relations_between(&self, first: &str, second: &str) -> Option<Vec<Arc<Relation>>>;

    /// Connection used to read `model`, honoring per-model selection hooks.
    fn read_connection(&self, model: &str, binds: &BindParams) -> Result<Arc<dyn Connection>>;

    /// Connection used to write `model`, honoring per-model selection hooks.
    fn write_connection(&self, model: &str, binds: &BindParams) -> Result<Arc<dyn Connection>>;

    fn persister(&self) -> Arc<dyn Persister>;

    /// Dispatch a model event to behaviors and events managers.
    fn notify_event(&self, event: &str, record: &mut Record) -> bool;
}

/// Writes single records.
///
/// `Ok(false)` is a data-level failure; the reasons are appended to the
/// record's messages. `Err` is reserved for driver and configuration
/// failures.
pub trait Persister: Send + Sync {
    fn create(
        &self,
        manager: &dyn ModelsManager,
        record: &mut Record,
        connection: &dyn Connection,
    ) -> Result<bool>;

    fn update(
        &self,
        manager: &dyn ModelsManager,
        record: &mut Record,
        connection: &dyn Connection,
    ) -> Result<bool>;

    fn delete(
        &self,
        manager: &dyn ModelsManager,
        record: &mut Record,
        connection: &dyn Connection,
    ) -> Result<bool>;
}
