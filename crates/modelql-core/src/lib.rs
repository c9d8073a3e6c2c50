//! Core types and collaborator interfaces for ModelQL.
//!
//! This crate holds everything the compiler, the executor and the relation
//! manager share:
//!
//! - `Value`, `Row` and `Record` data types
//! - the statement IR and the compiled fragment tree
//! - `Relation` metadata and `FindParameters`
//! - `Connection`, `Dialect`, `MetaData`, `Cache` and event interfaces
//! - the `ModelsManager` and `Persister` seams

pub mod cache;
pub mod connection;
pub mod container;
pub mod error;
pub mod events;
pub mod fragment;
pub mod ir;
pub mod manager;
pub mod metadata;
pub mod options;
pub mod params;
pub mod record;
pub mod relation;
pub mod row;
pub mod value;

pub use cache::{Cache, CacheOptions, MemoryCache};
pub use connection::{Connection, Dialect, ResultHandle};
pub use container::{Container, Service};
pub use error::{
    BindErrorKind, CompileErrorKind, Error, QueryErrorKind, RelationErrorKind, Result,
    ResultsetErrorKind, TransactionErrorKind,
};
pub use events::{Behavior, EventsManager, SimpleEventsManager};
pub use fragment::{ColumnSpec, Intermediate, SelectFragment, SqlExpr, TableSource};
pub use ir::Statement;
pub use manager::{ModelBinding, ModelsManager, Persister};
pub use metadata::{MemoryMetaData, MetaData, ModelDescriptor};
pub use options::OrmOptions;
pub use params::{BindParams, BindTypes, FindParameters, HydrateMode};
pub use record::{DirtyState, Message, Record};
pub use relation::{Fields, ForeignKey, ForeignKeyAction, Relation, RelationKind, RelationOptions};
pub use row::Row;
pub use value::{BindType, Value};
