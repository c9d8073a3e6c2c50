//! In-memory connection doubles, shared with the other crates' tests through
//! the `testing` feature.

#[cfg(test)]
mod manager;

#[cfg(test)]
pub(crate) use manager::MockManager;

use crate::render::GenericDialect;
use indexmap::IndexMap;
use modelql_core::{
    BindParams, BindTypes, Connection, Dialect, Result, ResultHandle, Row, TableSource, Value,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Everything a [`MockConnection`] was asked to do.
///
/// Writes are recorded with the physical table name they targeted.
#[derive(Debug, Default)]
pub struct MockState {
    pub queries: Vec<(String, BindParams)>,
    pub bind_types: Vec<BindTypes>,
    pub inserted: Vec<(String, IndexMap<String, Value>)>,
    /// `(table, values, conditions)`
    pub updated: Vec<(String, IndexMap<String, Value>, IndexMap<String, Value>)>,
    pub deleted: Vec<(String, IndexMap<String, Value>)>,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub in_transaction: bool,
    /// Rows returned by the next queries, one entry per query
    pub responses: VecDeque<Vec<Row>>,
}

/// Connection replaying queued rows. Clones share one [`MockState`].
///
/// Inserts return the running insert count as the generated identity.
#[derive(Clone)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
    dialect: GenericDialect,
    db_type: &'static str,
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            dialect: GenericDialect::default(),
            db_type: "sqlite",
        }
    }

    pub fn with_db_type(mut self, db_type: &'static str) -> Self {
        self.db_type = db_type;
        self
    }

    pub fn state(&self) -> Arc<Mutex<MockState>> {
        Arc::clone(&self.state)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue the rows returned by the next query.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.lock().responses.push_back(rows);
    }

    pub fn query_count(&self) -> usize {
        self.lock().queries.len()
    }

    /// SQL of the most recent query, or an empty string.
    pub fn last_sql(&self) -> String {
        self.lock()
            .queries
            .last()
            .map(|(sql, _)| sql.clone())
            .unwrap_or_default()
    }
}

impl Connection for MockConnection {
    fn query(&self, sql: &str, binds: &BindParams, types: &BindTypes) -> Result<Box<dyn ResultHandle>> {
        let mut state = self.lock();
        state.queries.push((sql.to_string(), binds.clone()));
        state.bind_types.push(types.clone());
        let rows = state.responses.pop_front().unwrap_or_default();
        Ok(Box::new(MockHandle::new(rows)))
    }

    fn execute(&self, sql: &str, binds: &BindParams, types: &BindTypes) -> Result<u64> {
        let mut state = self.lock();
        state.queries.push((sql.to_string(), binds.clone()));
        state.bind_types.push(types.clone());
        Ok(0)
    }

    fn insert(&self, table: &TableSource, values: &IndexMap<String, Value>) -> Result<Option<Value>> {
        let mut state = self.lock();
        state.inserted.push((table.source.clone(), values.clone()));
        Ok(Some(Value::Int(state.inserted.len() as i64)))
    }

    fn update(
        &self,
        table: &TableSource,
        values: &IndexMap<String, Value>,
        conditions: &IndexMap<String, Value>,
    ) -> Result<u64> {
        self.lock()
            .updated
            .push((table.source.clone(), values.clone(), conditions.clone()));
        Ok(1)
    }

    fn delete(&self, table: &TableSource, conditions: &IndexMap<String, Value>) -> Result<u64> {
        self.lock()
            .deleted
            .push((table.source.clone(), conditions.clone()));
        Ok(1)
    }

    fn begin(&self) -> Result<()> {
        let mut state = self.lock();
        state.begins += 1;
        state.in_transaction = true;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.lock();
        state.commits += 1;
        state.in_transaction = false;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.lock();
        state.rollbacks += 1;
        state.in_transaction = false;
        Ok(())
    }

    fn is_under_transaction(&self) -> bool {
        self.lock().in_transaction
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn db_type(&self) -> &str {
        self.db_type
    }
}

/// Result handle over fixed rows, counting native seeks.
pub struct MockHandle {
    rows: Vec<Row>,
    position: usize,
    seeks: Arc<Mutex<usize>>,
}

impl MockHandle {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            position: 0,
            seeks: Arc::new(Mutex::new(0)),
        }
    }

    pub fn seeks(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.seeks)
    }
}

impl ResultHandle for MockHandle {
    fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn fetch(&mut self) -> Result<Option<Row>> {
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }

    fn data_seek(&mut self, position: usize) -> Result<()> {
        *self.seeks.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        self.position = position;
        Ok(())
    }
}

/// A row with the given column names and values.
pub fn row(columns: &[(&str, Value)]) -> Row {
    Row::new(
        columns.iter().map(|(name, _)| (*name).to_string()).collect(),
        columns.iter().map(|(_, value)| value.clone()).collect(),
    )
}
