//! ModelQL - object queries, relations and resultsets for model-based ORMs.
//!
//! ModelQL is the query-execution core of an object-relational mapper:
//!
//! - A compiler from statement IR over model classes to a
//!   dialect-independent fragment tree, with implicit joins from declared
//!   relations and eager loading
//! - A query executor that binds parameters, resolves connections or an
//!   attached transaction, and returns resultsets or statuses
//! - Lazy, seekable resultsets with hydration modes, caching and
//!   transactional batch updates and deletes
//! - A relation manager that registers models and relations and fetches
//!   related records
//!
//! # Quick Start
//!
//! ```ignore
//! use modelql::prelude::*;
//!
//! let meta = MemoryMetaData::new()
//!     .with_model("Customers", ModelDescriptor::new().columns(["id", "name"]).primary_key(["id"]))
//!     .with_model("Invoices", ModelDescriptor::new().columns(["id", "cst_id"]).primary_key(["id"]));
//! let container = Container::new();
//! container.set_connection("db", connection);
//!
//! let manager = RelationManager::new(Arc::new(meta)).with_container(Arc::new(container));
//! manager.register(Arc::new(ClosureModel::new("Customers", |manager: &RelationManager| {
//!     manager.add_has_many("Customers", "id", "Invoices", "cst_id", RelationOptions::new().alias("invoices"))?;
//!     Ok(())
//! })));
//! manager.register(Arc::new(NamedModel::new("Invoices")));
//!
//! // SELECT c.* FROM Customers AS c WHERE c.id = :id:
//! let statement = Statement::Select(
//!     SelectStatement::new()
//!         .column(SelectColumn::AllOf("c".into()))
//!         .from(TableRef::new("Customers").alias("c"))
//!         .filter(Expr::qualified("c", "id").equals(Expr::named("id"))),
//! );
//! let mut binds = BindParams::new();
//! binds.insert("id".into(), Value::Int(5));
//! let customer = manager
//!     .create_query(statement)
//!     .get_single_result(&binds, &BindTypes::new())?;
//!
//! let invoices = manager
//!     .get_has_many_records("Customers", "Invoices", customer.as_ref().and_then(ResultRow::as_record).unwrap(), None, None)?;
//! ```

pub use modelql_core::{
    Behavior, BindErrorKind, BindParams, BindType, BindTypes, Cache, CacheOptions,
    CompileErrorKind, Connection, Container, Dialect, DirtyState, Error, EventsManager, Fields,
    FindParameters, ForeignKey, ForeignKeyAction, HydrateMode, MemoryCache, MemoryMetaData,
    Message, MetaData, ModelBinding, ModelDescriptor, ModelsManager, OrmOptions, Persister,
    QueryErrorKind, Record, Relation, RelationErrorKind, RelationKind, RelationOptions, Result,
    ResultHandle, ResultsetErrorKind, Row, Service, SimpleEventsManager, Statement, TableSource,
    TransactionErrorKind, Value,
};

/// Statement IR consumed by the compiler.
pub use modelql_core::ir;

pub use modelql_query::{
    ComplexColumn, Flavor, GenericDialect, Query, QueryBuilder, QueryResult, ResultItem,
    ResultRow, ResultShape, Resultset, ResultsetFactory, ResultsetSnapshot, ResultsetType,
    SqlStatement, Status, Transaction, TransactionManager,
};

pub use modelql_manager::{
    ClosureModel, ModelClass, ModelFinder, ModelId, NamedModel, QueryFinder, RelationManager,
    RelationRecords, RetrieveMethod, TablePersister,
};

/// Common imports for applications.
///
/// ```ignore
/// use modelql::prelude::*;
/// ```
pub mod prelude {
    pub use crate::ir::{
        Assignment, BinaryOp, DeleteStatement, Expr, InsertStatement, Join, JoinKind, Limit,
        OrderItem, SelectColumn, SelectStatement, TableRef, UpdateStatement,
    };
    pub use crate::{
        // Values and parameters
        BindParams,
        BindType,
        BindTypes,
        // Collaborators
        Connection,
        Container,
        Error,
        FindParameters,
        HydrateMode,
        MemoryMetaData,
        ModelDescriptor,
        // Models and relations
        ModelClass,
        ClosureModel,
        NamedModel,
        OrmOptions,
        // Queries and results
        Query,
        QueryBuilder,
        QueryResult,
        Record,
        RelationManager,
        RelationOptions,
        RelationRecords,
        Result,
        ResultRow,
        Resultset,
        RetrieveMethod,
        Statement,
        Status,
        Transaction,
        Value,
    };
    pub use std::sync::Arc;
}
