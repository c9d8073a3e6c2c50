//! Model registry and relation management for ModelQL.
//!
//! `modelql-manager` provides [`RelationManager`], the concrete
//! `ModelsManager` that queries compile and execute against. It owns:
//!
//! - model classes, their one-time initialization and per-model bindings
//! - the relation graph (belongs-to, has-one, has-many and the two
//!   through kinds) with alias lookup
//! - fetching related records through a pluggable [`ModelFinder`]
//! - the memo of related records for reusable relations
//! - behaviors and events managers
//! - [`TablePersister`], the default single-record writer

pub mod finder;
pub mod graph;
pub mod manager;
pub mod model;
pub mod persister;
pub mod records;
mod reusable;

#[cfg(test)]
mod testing;

pub use finder::{ModelFinder, QueryFinder, ROWCOUNT_ALIAS};
pub use graph::RelationGraph;
pub use manager::{AFTER_INITIALIZE_EVENT, DEFAULT_CONNECTION_SERVICE, RelationManager};
pub use model::{ClosureModel, ModelClass, ModelId, NamedModel, default_source, short_name};
pub use persister::TablePersister;
pub use records::{RelationRecords, RetrieveMethod};
