//! Database connection, result handle and dialect interfaces.
//!
//! These are implemented by database adapters. All methods are blocking and
//! take `&self`; adapters keep their mutable state behind their own locks so a
//! connection can be shared as `Arc<dyn Connection>`.

use crate::Result;
use crate::fragment::{RenderSelect, SqlExpr, TableSource};
use crate::params::{BindParams, BindTypes};
use crate::row::Row;
use crate::value::Value;
use indexmap::IndexMap;

/// A live result of a query.
pub trait ResultHandle: Send {
    /// Total number of rows in the result.
    fn num_rows(&self) -> usize;

    /// Fetch the row under the native cursor and advance it.
    fn fetch(&mut self) -> Result<Option<Row>>;

    /// Fetch every remaining row.
    fn fetch_all(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Move the native cursor to an absolute position.
    fn data_seek(&mut self, position: usize) -> Result<()>;
}

/// Renders fragment trees into literal SQL for one database system.
pub trait Dialect: Send + Sync {
    /// Render a complete SELECT.
    fn select(&self, select: &RenderSelect<'_>) -> Result<String>;

    /// Wrap a SELECT so it takes a shared lock.
    fn shared_lock(&self, sql: &str) -> String;

    /// Wrap a SELECT so it locks the selected rows for update.
    fn for_update(&self, sql: &str) -> String;

    /// Render a single expression.
    fn sql_expression(&self, expr: &SqlExpr) -> Result<String>;
}

/// A database connection.
pub trait Connection: Send + Sync {
    /// Run a query returning rows.
    fn query(&self, sql: &str, binds: &BindParams, types: &BindTypes)
    -> Result<Box<dyn ResultHandle>>;

    /// Run a statement returning the number of affected rows.
    fn execute(&self, sql: &str, binds: &BindParams, types: &BindTypes) -> Result<u64>;

    /// Insert one row. Returns the generated identity value, if any.
    fn insert(&self, table: &TableSource, values: &IndexMap<String, Value>)
    -> Result<Option<Value>>;

    /// Update the rows matching every `conditions` column.
    fn update(
        &self,
        table: &TableSource,
        values: &IndexMap<String, Value>,
        conditions: &IndexMap<String, Value>,
    ) -> Result<u64>;

    /// Delete the rows matching every `conditions` column.
    fn delete(&self, table: &TableSource, conditions: &IndexMap<String, Value>) -> Result<u64>;

    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    fn is_under_transaction(&self) -> bool;

    /// The SQL renderer of this connection.
    fn dialect(&self) -> &dyn Dialect;

    /// Database system name, e.g. `"mysql"` or `"sqlite"`.
    fn db_type(&self) -> &str;
}
