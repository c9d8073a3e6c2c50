//! Query compilation and execution for ModelQL.
//!
//! `modelql-query` is the **execution layer**. It turns statement IR into
//! SQL against the connections a models manager resolves, and wraps the
//! results.
//!
//! # Role In The Architecture
//!
//! - **Compiler**: resolves models, aliases and columns, and completes joins
//!   from declared relations.
//! - **Query**: binds parameters, picks connections, renders through the
//!   connection's dialect and executes.
//! - **Resultset**: lazy, seekable cursor with hydration modes and
//!   transactional batch updates and deletes.
//! - **Transaction**: a unit of work shared between queries.
//!
//! The relation manager in `modelql-manager` implements the
//! `ModelsManager` seam this crate compiles and executes against.

pub mod bind;
pub mod builder;
pub mod compiler;
pub mod query;
pub mod render;
pub mod resultset;
pub mod status;
pub mod transaction;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bind::process_binds;
pub use builder::QueryBuilder;
pub use compiler::{CompilationScope, Compiled, Compiler};
pub use query::{Query, QueryResult, ResultsetResolver, SqlStatement};
pub use render::{Flavor, GenericDialect};
pub use resultset::{
    ComplexColumn, ResultItem, ResultRow, ResultShape, Resultset, ResultsetFactory,
    ResultsetSnapshot, ResultsetType,
};
pub use status::Status;
pub use transaction::{Transaction, TransactionManager};
